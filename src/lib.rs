//! prelude exports common things for the breadboard machine such as the
//! chip, cpu, bus, memory and peripheral modules.

/// prelude exports common items for the emulated machine.
pub mod prelude {
    pub use acia::*;
    pub use bus::*;
    pub use chip::*;
    pub use cpu::*;
    pub use memory::*;
    pub use via::*;
}
