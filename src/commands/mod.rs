pub mod publish;
pub mod run;

pub use publish::handle_publish;
pub use run::handle_run;
