pub mod build;
pub mod capabilities;
pub mod demo;
pub mod inspect;
pub mod run;

pub use build::*;
pub use capabilities::*;
pub use demo::*;
pub use inspect::*;
pub use run::*;
