pub mod controls;
pub mod err;
