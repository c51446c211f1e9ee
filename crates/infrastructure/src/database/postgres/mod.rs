pub mod command_repository;
pub mod definition_repository;
pub mod process_instance_repository;
pub mod server_registry;
pub mod task_instance_repository;

pub use command_repository::*;
pub use definition_repository::*;
pub use process_instance_repository::PostgresProcessInstanceRepository;
pub use server_registry::*;
pub use task_instance_repository::*;
