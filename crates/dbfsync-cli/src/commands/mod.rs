mod init;
mod reset;
mod run;
mod status;

pub use init::cmd_init;
pub use reset::cmd_reset;
pub use run::cmd_run;
pub use status::cmd_status;
