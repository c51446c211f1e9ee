pub mod alert;
pub mod registry;
pub mod repository;
pub mod task_queue;

pub use alert::*;
pub use registry::*;
pub use repository::*;
pub use task_queue::*;
