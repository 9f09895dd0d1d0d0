//! Built-in feature installers.

mod jmeter;
mod pandora;
mod phantom;
mod telegraf;

pub use jmeter::JmeterInstaller;
pub use pandora::PandoraInstaller;
pub use phantom::PhantomInstaller;
pub use telegraf::TelegrafInstaller;
