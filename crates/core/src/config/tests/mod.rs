mod app_config_tests;
mod validation_tests;
