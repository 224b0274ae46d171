/*
    MartyPC
    https://github.com/dbalsom/martypc

    Copyright 2022-2025 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    ---------------------------------------------------------------------------

    cpu_common::error.rs

    Core error types. CpuError covers host-side failures (bad configuration, decode
    errors). CpuFault is a guest-visible fault that unwinds an instruction handler.

*/

use crate::cpu_common::{CpuException, Segment};
use std::{error::Error, fmt, fmt::Display};

#[derive(Debug)]
pub enum CpuError {
    InvalidManufacturer(usize),
    InvalidModel(usize, usize),
    UnknownModelName(String),
    InstructionDecodeError(u32),
    CpuHaltedError(u32),
    ExceptionError(CpuFault),
}
impl Error for CpuError {}
impl Display for CpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpuError::InvalidManufacturer(idx) => {
                write!(f, "Invalid manufacturer index: {}", idx)
            }
            CpuError::InvalidModel(m, idx) => {
                write!(f, "Invalid model index {} for manufacturer index {}", idx, m)
            }
            CpuError::UnknownModelName(name) => {
                write!(f, "No CPU model named '{}'", name)
            }
            CpuError::InstructionDecodeError(addr) => write!(
                f,
                "An error occurred during instruction decode at address: {:08X}",
                addr
            ),
            CpuError::CpuHaltedError(addr) => {
                write!(f, "The CPU was halted at address: {:08X}.", addr)
            }
            CpuError::ExceptionError(fault) => {
                write!(f, "The CPU threw an exception: {}", fault)
            }
        }
    }
}

/// Diagnostic context attached to a fault. Never visible to the guest.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FaultDetail {
    None,
    Msr(u32),
    Memory { address: u32, write: bool },
    SegmentLimit { segment: Segment, offset: u32 },
    Opcode(u8),
    Port(u16),
}

/// A guest-visible fault raised while executing an instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CpuFault {
    pub exception: CpuException,
    pub error_code: Option<u32>,
    pub detail: FaultDetail,
}

impl CpuFault {
    pub fn new(exception: CpuException, error_code: Option<u32>, detail: FaultDetail) -> Self {
        Self {
            exception,
            error_code,
            detail,
        }
    }

    /// #GP(0)
    pub fn gp(detail: FaultDetail) -> Self {
        Self::new(CpuException::GeneralProtection, Some(0), detail)
    }

    /// #UD for the given opcode byte.
    pub fn ud(opcode: u8) -> Self {
        Self::new(CpuException::InvalidOpcode, None, FaultDetail::Opcode(opcode))
    }

    /// #NM
    pub fn nm() -> Self {
        Self::new(CpuException::DeviceNotAvailable, None, FaultDetail::None)
    }

    pub fn vector(&self) -> u8 {
        self.exception.vector()
    }
}

impl Display for CpuFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (vector {})", self.exception.mnemonic(), self.vector())?;
        if let Some(code) = self.error_code {
            write!(f, " error code {:04X}", code)?;
        }
        match self.detail {
            FaultDetail::None => Ok(()),
            FaultDetail::Msr(idx) => write!(f, " [msr {:08X}]", idx),
            FaultDetail::Memory { address, write } => {
                write!(f, " [{} {:08X}]", if write { "write" } else { "read" }, address)
            }
            FaultDetail::SegmentLimit { segment, offset } => {
                write!(f, " [{:?}:{:08X} beyond limit]", segment, offset)
            }
            FaultDetail::Opcode(op) => write!(f, " [opcode {:02X}]", op),
            FaultDetail::Port(port) => write!(f, " [port {:04X}]", port),
        }
    }
}

impl Error for CpuFault {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_display() {
        let fault = CpuFault::gp(FaultDetail::Msr(0x1234));
        assert_eq!(fault.vector(), 13);
        assert_eq!(fault.to_string(), "#GP (vector 13) error code 0000 [msr 00001234]");

        let ud = CpuFault::ud(0x0F);
        assert_eq!(ud.error_code, None);
        assert_eq!(ud.to_string(), "#UD (vector 6) [opcode 0F]");
    }

    #[test]
    fn test_error_display() {
        let e = CpuError::InvalidModel(1, 99);
        assert_eq!(e.to_string(), "Invalid model index 99 for manufacturer index 1");
    }
}
