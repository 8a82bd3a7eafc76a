//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises the server and the
//! board handlers end to end (wire bytes in, wire bytes out) against
//! a mock board.  All tests run on the host with no real hardware.

mod board_function_tests;
mod dispatch_tests;
mod mock_hw;
