pub mod heal;
pub mod monitor;
pub mod patterns;
pub mod scan;
pub mod validate_mechanisms;
