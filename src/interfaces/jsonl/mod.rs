pub mod journal_reader;
