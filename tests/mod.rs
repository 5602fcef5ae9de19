mod common;

mod connection_tests;
