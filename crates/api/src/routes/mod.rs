pub mod ab_tests;
pub mod budget;
pub mod creative;
pub mod mix;
pub mod rules;
