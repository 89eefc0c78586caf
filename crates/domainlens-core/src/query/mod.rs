pub mod guards;
pub mod hybrid;
pub mod search;
pub mod tokenizer;
