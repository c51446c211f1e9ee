pub mod date;
pub mod dependent_date;
pub mod params;
