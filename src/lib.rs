pub mod catalog;
pub mod db;
pub mod progress;
pub mod reconcile;
pub mod xp;
