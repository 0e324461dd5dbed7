pub mod callback;
pub mod details;
pub mod i18n;
pub mod ledger;
pub mod money;
pub mod notification;
pub mod ports;
pub mod status;
pub mod terms;
pub mod wire;
