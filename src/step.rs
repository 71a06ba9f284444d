//! The decode/execute seam.
//!
//! The simulator core deliberately does not know how to decode ARM
//! instructions. Whoever embeds it supplies a [`Stepper`]; the debugger
//! front-end drives execution exclusively through that trait.

use crate::core::ArmCore;
use crate::exception::Exception;

/// Decode and execute a single instruction.
///
/// One call performs one complete instruction: the fetch (which counts the
/// cycle and advances R15), any memory traffic, register updates and, on an
/// exception, the mode switch. The return value is the exception the
/// instruction raised, if any; it becomes the stop reason reported to the
/// debugger.
pub trait Stepper {
    /// Execute one instruction on `core`.
    fn step(&mut self, core: &mut ArmCore) -> Option<Exception>;
}

impl<F> Stepper for F
where
    F: FnMut(&mut ArmCore) -> Option<Exception>,
{
    fn step(&mut self, core: &mut ArmCore) -> Option<Exception> {
        self(core)
    }
}

/// A core paired with its step primitive.
///
/// This is the object debugger sessions share; a
/// [`FairMutex`](parking_lot::FairMutex) around it serializes command
/// handlers against any other producer of target events.
pub struct Simulator {
    /// The processor core, including its memory and trace sink.
    pub core: ArmCore,
    /// The instruction decode/execute primitive.
    pub stepper: Box<dyn Stepper + Send>,
}

impl Simulator {
    /// Pair `core` with `stepper`.
    pub fn new(core: ArmCore, stepper: Box<dyn Stepper + Send>) -> Self {
        Simulator { core, stepper }
    }
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}
