pub mod account;
pub mod add;
pub mod category;
pub mod common;
pub mod completions;
pub mod delete;
pub mod edit;
pub mod favorite;
pub mod list;
pub mod search;
pub mod settings;
pub mod status;
pub mod sync;
