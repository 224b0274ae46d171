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

    cpu_x86::ports.rs

    Port IO from the core. Ports owned by the core itself (the Cyrix configuration registers
    and the coprocessor control ports) are serviced here; everything else goes to the bus.

*/

use crate::{
    bus::{IoDeviceType, NO_IO_BYTE},
    cpu_common::CpuType,
    cpu_x86::{CpuContext, OperandWidth},
};

// Cyrix configuration register indices
pub const CYRIX_CCR0: u8 = 0xC0;
pub const CYRIX_CCR3: u8 = 0xC3;
pub const CYRIX_CCR4: u8 = 0xE8;
pub const CYRIX_CCR6: u8 = 0xEA;
pub const CYRIX_DIR0: u8 = 0xFE;
pub const CYRIX_DIR1: u8 = 0xFF;

/// CCR4 CPUIDEN
pub const CCR4_CPUID_ENABLE: u8 = 0x80;

impl CpuContext {
    /// Read a byte from a port, charging the bus cycle.
    pub fn port_in_u8(&mut self, port: u16) -> u8 {
        let byte = match self.bus.io_device_type(port) {
            Some(IoDeviceType::CyrixConfig) => {
                let byte = self.cyrix_read(port);
                self.bus.record_io_read(port, byte, true);
                byte
            }
            Some(IoDeviceType::FpuControl) => {
                self.bus.record_io_read(port, NO_IO_BYTE, true);
                NO_IO_BYTE
            }
            _ => {
                let wait = self.bus.io_wait(port, false);
                cycles!(self, wait);
                self.bus.io_read_u8(port, self.instr_cycles())
            }
        };
        cycles!(self, self.model.atclk_div);
        byte
    }

    /// Write a byte to a port, charging the bus cycle.
    pub fn port_out_u8(&mut self, port: u16, data: u8) {
        match self.bus.io_device_type(port) {
            Some(IoDeviceType::CyrixConfig) => {
                self.cyrix_write(port, data);
                self.bus.record_io_write(port, data, true);
            }
            Some(IoDeviceType::FpuControl) => {
                self.fpu_port_write(port);
                self.bus.record_io_write(port, data, true);
            }
            _ => {
                let wait = self.bus.io_wait(port, true);
                cycles!(self, wait);
                self.bus.io_write_u8(port, data, self.instr_cycles());
            }
        }
        cycles!(self, self.model.atclk_div);
    }

    /// Wider port accesses are split into consecutive byte accesses, low byte first.
    pub fn port_in(&mut self, port: u16, width: OperandWidth) -> u32 {
        let mut value = 0;
        for i in 0..width.bytes() {
            value |= (self.port_in_u8(port.wrapping_add(i as u16)) as u32) << (i * 8);
        }
        value
    }

    pub fn port_out(&mut self, port: u16, width: OperandWidth, value: u32) {
        for i in 0..width.bytes() {
            self.port_out_u8(port.wrapping_add(i as u16), (value >> (i * 8)) as u8);
        }
    }

    fn cyrix_read(&mut self, port: u16) -> u8 {
        if port & 1 == 0 {
            return NO_IO_BYTE;
        }
        let m = &self.model;
        match m.cyrix_index {
            CYRIX_CCR0..=CYRIX_CCR3 => m.ccr[(m.cyrix_index - CYRIX_CCR0) as usize],
            CYRIX_CCR4..=CYRIX_CCR6 => {
                if m.cyrix_mapen() {
                    m.ccr[(m.cyrix_index - CYRIX_CCR4) as usize + 4]
                }
                else {
                    NO_IO_BYTE
                }
            }
            CYRIX_DIR0 => m.descriptor.cyrix_id as u8,
            CYRIX_DIR1 => (m.descriptor.cyrix_id >> 8) as u8,
            _ => NO_IO_BYTE,
        }
    }

    fn cyrix_write(&mut self, port: u16, data: u8) {
        let m = &mut self.model;
        if port & 1 == 0 {
            m.cyrix_index = data;
            return;
        }
        match m.cyrix_index {
            CYRIX_CCR0..=CYRIX_CCR3 => m.ccr[(m.cyrix_index - CYRIX_CCR0) as usize] = data,
            CYRIX_CCR4 => {
                if m.cyrix_mapen() {
                    m.ccr[4] = data;
                    if m.cpu_type >= CpuType::Cx6x86 {
                        m.cpuid = if data & CCR4_CPUID_ENABLE != 0 {
                            m.descriptor.cpuid_model
                        }
                        else {
                            0
                        };
                        log::debug!("Cyrix CCR4 write {:02X}: CPUID {:04X}", data, m.cpuid);
                    }
                }
            }
            CYRIX_CCR4..=CYRIX_CCR6 => {
                if m.cyrix_mapen() {
                    m.ccr[(m.cyrix_index - CYRIX_CCR4) as usize + 4] = data;
                }
            }
            _ => {}
        }
    }

    fn fpu_port_write(&mut self, port: u16) {
        match port {
            0xF0 => {
                // Clear the coprocessor busy latch.
                self.set_fpu_error_latch(false);
            }
            0xF1 => {
                log::debug!("FPU reset through port F1h");
                self.fpu.init();
                self.set_fpu_error_latch(false);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bus::{BusInterface, IoDevice},
        cpu_common::models::find_model,
    };

    fn cpu_for(name: &str) -> CpuContext {
        let (manufacturer, idx) = find_model(name).unwrap();
        let mut cpu = CpuContext::new(BusInterface::default());
        cpu.configure(manufacturer.index(), idx).unwrap();
        cpu
    }

    fn ccr_read(cpu: &mut CpuContext, index: u8) -> u8 {
        cpu.port_out_u8(0x22, index);
        cpu.port_in_u8(0x23)
    }

    fn ccr_write(cpu: &mut CpuContext, index: u8, data: u8) {
        cpu.port_out_u8(0x22, index);
        cpu.port_out_u8(0x23, data);
    }

    #[test]
    fn test_ccr_access() {
        let mut cpu = cpu_for("Cx486DX2/66");
        ccr_write(&mut cpu, CYRIX_CCR0, 0x12);
        assert_eq!(ccr_read(&mut cpu, CYRIX_CCR0), 0x12);
        assert_eq!(ccr_read(&mut cpu, CYRIX_DIR0), 0x1B);
        assert_eq!(ccr_read(&mut cpu, CYRIX_DIR1), 0x0B);
        // Unknown index
        assert_eq!(ccr_read(&mut cpu, 0x50), 0xFF);
        // The index port itself reads open.
        assert_eq!(cpu.port_in_u8(0x22), 0xFF);
    }

    #[test]
    fn test_mapen_gates_ccr4() {
        let mut cpu = cpu_for("Cx6x86/PR150+");
        assert_eq!(cpu.model.cpuid, 0);
        // Locked
        ccr_write(&mut cpu, CYRIX_CCR4, CCR4_CPUID_ENABLE);
        assert_eq!(cpu.model.cpuid, 0);
        assert_eq!(ccr_read(&mut cpu, CYRIX_CCR4), 0xFF);

        ccr_write(&mut cpu, CYRIX_CCR3, 0x10);
        ccr_write(&mut cpu, CYRIX_CCR4, CCR4_CPUID_ENABLE);
        assert_eq!(cpu.model.cpuid, 0x520);
        assert_eq!(ccr_read(&mut cpu, CYRIX_CCR4), 0x80);
        ccr_write(&mut cpu, CYRIX_CCR6, 0x41);
        assert_eq!(cpu.model.ccr[6], 0x41);

        ccr_write(&mut cpu, CYRIX_CCR4, 0);
        assert_eq!(cpu.model.cpuid, 0);
    }

    #[test]
    fn test_ports_inactive_on_intel() {
        let mut cpu = cpu_for("i486DX/33");
        ccr_write(&mut cpu, CYRIX_CCR0, 0x12);
        assert_eq!(cpu.model.ccr[0], 0);
        assert_eq!(ccr_read(&mut cpu, CYRIX_CCR0), 0xFF);
    }

    #[test]
    fn test_fpu_ports() {
        let mut cpu = cpu_for("i486DX/33");
        cpu.fpu.push(1.0);
        cpu.set_fpu_error_latch(true);
        cpu.port_out_u8(0xF0, 0);
        assert!(!cpu.fpu_error_pending());
        cpu.port_out_u8(0xF1, 0);
        assert_eq!(cpu.fpu.tag_word(), 0xFFFF);
        assert_eq!(cpu.port_in_u8(0xF4), 0xFF);
    }

    struct WaitPort;

    impl IoDevice for WaitPort {
        fn read_u8(&mut self, _port: u16, _cycles: u32) -> u8 {
            0x5A
        }
        fn read_wait(&mut self, _port: u16) -> u32 {
            5
        }
        fn port_list(&self) -> Vec<(String, u16)> {
            vec![("Wait Port".to_string(), 0x300), ("Wait Port".to_string(), 0x301)]
        }
    }

    #[test]
    fn test_external_port_timing() {
        let mut cpu = cpu_for("286/12");
        cpu.bus.add_io_device(Box::new(WaitPort));
        let before = cpu.cycle_count();
        assert_eq!(cpu.port_in(0x300, OperandWidth::Word), 0x5A5A);
        // Two byte accesses, each with 5 wait states and one AT bus clock of 2.
        assert_eq!(cpu.cycle_count() - before, 14);
    }
}
