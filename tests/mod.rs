mod support;

mod audit_tests;
mod queue_tests;
mod retry_tests;
