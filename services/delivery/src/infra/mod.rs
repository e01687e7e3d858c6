pub mod accounts;
pub mod artifact;
pub mod db;
