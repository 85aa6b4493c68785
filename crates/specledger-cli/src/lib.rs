pub mod cmd;
pub mod errors;
pub mod output;
pub mod root;
