pub mod consensus;
pub mod display;
pub mod driver;
pub mod features;
pub mod linkage;
pub mod output;
pub mod resample;
pub mod runners;
pub mod stability;
