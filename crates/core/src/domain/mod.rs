pub mod identity;
pub mod intent;
pub mod opportunity;
