//! Integration tests across the pipeline, HTTP clients and report output

pub mod report_file;
pub mod yahoo_http;
