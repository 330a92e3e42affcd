//! Guest CPU execution abstraction

use core_types::CarrierId;

/// Execution vehicle for one guest thread
///
/// The vehicle is whatever advances the guest thread's program counter
/// (interpreter, JIT, ...). The scheduler never drives it directly; it only
/// tells it to start, stop or yield.
///
/// # Interrupts
///
/// `request_interrupt` is advisory. The vehicle checks the request at its
/// next safe point and re-enters the scheduler on its own. Nothing is
/// suspended asynchronously.
pub trait ExecutionVehicle: Send + Sync {
    /// Returns the host carrier that drives this vehicle
    fn carrier(&self) -> CarrierId;

    /// Returns true if `caller` is the carrier of this vehicle
    fn is_current_host_thread(&self, caller: CarrierId) -> bool {
        self.carrier() == caller
    }

    /// Asks the running guest code to yield at its next safe point
    fn request_interrupt(&self);

    /// Resumes guest instruction decoding
    fn execute(&self);

    /// Terminates guest execution for good
    fn stop_execution(&self);
}
