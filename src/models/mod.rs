pub mod alert;
pub mod server;
pub mod update_history;

#[allow(unused_imports)]
pub mod prelude {
    pub use super::alert::{self, Entity as Alert};
    pub use super::server::{self, Entity as Server};
    pub use super::update_history::{self, Entity as UpdateHistory};
}
