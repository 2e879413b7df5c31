//! Text formats written and read by flux runs.
//!
//! All files are whitespace separated and opened in append mode, so repeated runs with the
//! same file base accumulate rather than overwrite. Per-frequency PFT records and the
//! integrated `.out` table use C-style `%e` number formatting; the flux cache uses
//! shortest round-trip formatting so that reading it back reproduces the values exactly.

pub mod frequencies;
pub mod output;
pub mod records;
