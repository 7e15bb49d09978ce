pub mod dates;
pub mod export;
pub mod json;
pub mod nested;
