// Test-only crate for exercising refcom from a host environment.
#![no_std]

#[cfg(test)]
extern crate std;
