pub mod clienthello;
pub mod grease;
pub mod ja3;
pub mod types;
