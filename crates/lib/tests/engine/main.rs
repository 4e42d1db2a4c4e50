mod build_tests;
mod common;
mod resolve_tests;
