mod common;
mod ingestion;
mod mapping_sync;
