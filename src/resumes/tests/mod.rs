// src/resumes/tests/mod.rs

mod callback_tests;
mod validators_tests;
