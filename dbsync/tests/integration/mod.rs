mod coordinator_test;
mod sql_source_test;
mod support;
mod uploader_test;
