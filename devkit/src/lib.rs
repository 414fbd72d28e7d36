/*!
# fleetprobe DevKit - simulated hosts and fixtures for testing

Test support for the fleetprobe pipelines without a real SSH server:
- `SimulatedProvider`: scripted hosts behind the `SessionProvider` seam
- `fixtures`: captured output of top, free and df from several builds
- `TestHarness`: logging setup, batch builders and output assertions
*/

pub mod fixtures;
pub mod session_stub;
pub mod test_utils;

pub use session_stub::{HostScript, SimulatedProvider, SimulatedSession};
pub use test_utils::TestHarness;
