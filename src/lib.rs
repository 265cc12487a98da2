pub mod jm;
