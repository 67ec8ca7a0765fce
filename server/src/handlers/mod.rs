pub mod run_handlers;
