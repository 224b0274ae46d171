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

    bus::mod.rs

    Implements the system bus: conventional memory, memory-mapped device hooks and the
    IO port map that devices and the CPU core register handlers in.

*/

#![allow(dead_code)]

pub mod io;
pub mod memory;

use fxhash::{FxHashMap, FxHashSet};

pub const NO_IO_BYTE: u8 = 0xFF;
pub const OPEN_BUS_BYTE: u8 = 0xFF;
pub const PAGE_SHIFT: u32 = 12;
pub const DEVICE_DESC_LEN: usize = 28;

/// The owner of an IO port. Ports owned by the CPU core itself are serviced by the core;
/// external devices are serviced through the [IoDevice] trait.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum IoDeviceType {
    CyrixConfig,
    FpuControl,
    External(usize),
}

/// The port IO and timer contract for devices attached to the bus.
pub trait IoDevice {
    /// Read a byte from the specified port. `cycles` is the CPU cycle count elapsed in the
    /// current instruction, which a device may use to catch up its state.
    /// The default implementation returns NO_IO_BYTE (0xFF).
    fn read_u8(&mut self, _port: u16, _cycles: u32) -> u8 {
        NO_IO_BYTE
    }

    /// Write a byte to the specified port.
    /// The default implementation does nothing.
    fn write_u8(&mut self, _port: u16, _data: u8, _cycles: u32) {
        // Default implementation does nothing
    }

    /// Return the number of wait cycles incurred by an immediate read from the port.
    fn read_wait(&mut self, _port: u16) -> u32 {
        0
    }

    /// Return the number of wait cycles incurred by an immediate write to the port.
    fn write_wait(&mut self, _port: u16) -> u32 {
        0
    }

    /// Advance the device by the given number of CPU cycles. Called once per executed
    /// instruction.
    fn run(&mut self, _cycles: u32) {}

    /// Return a list of ports the device should service, comprised of a vector of tuples of
    /// (port description, port number).
    fn port_list(&self) -> Vec<(String, u16)>;
}

/// A device that claims a range of the physical address space.
pub trait MmioDevice {
    fn mmio_read_u8(&mut self, address: u32) -> u8;
    fn mmio_write_u8(&mut self, address: u32, data: u8);
    /// Return the (base address, length) of the device mapping.
    fn mapping(&self) -> (u32, u32);
}

#[derive(Copy, Clone, Debug, Default)]
pub struct IoDeviceStats {
    pub last_read: u8,
    pub last_write: u8,
    pub reads: usize,
    pub reads_dirty: bool,
    pub writes: usize,
    pub writes_dirty: bool,
}

impl IoDeviceStats {
    pub fn one_read() -> Self {
        Self {
            reads: 1,
            reads_dirty: true,
            ..Default::default()
        }
    }

    pub fn one_write() -> Self {
        Self {
            writes: 1,
            writes_dirty: true,
            ..Default::default()
        }
    }
}

pub struct BusInterface {
    memory: Vec<u8>,
    address_mask: u32,
    fault_pages: FxHashSet<u32>,

    mmio_map: Vec<(u32, u32, usize)>,
    mmio_devices: Vec<Box<dyn MmioDevice>>,

    io_map: FxHashMap<u16, IoDeviceType>,
    io_desc_map: FxHashMap<u16, String>,
    io_devices: Vec<Box<dyn IoDevice>>,
    io_stats: FxHashMap<u16, (bool, IoDeviceStats)>,
}

impl Default for BusInterface {
    fn default() -> Self {
        BusInterface::new(0x100000)
    }
}

impl BusInterface {
    pub fn new(memory_size: usize) -> BusInterface {
        BusInterface {
            memory: vec![0; memory_size],
            address_mask: 0xFFFF_FFFF,
            fault_pages: FxHashSet::default(),
            mmio_map: Vec::new(),
            mmio_devices: Vec::new(),
            io_map: FxHashMap::default(),
            io_desc_map: FxHashMap::default(),
            io_devices: Vec::new(),
            io_stats: FxHashMap::default(),
        }
    }

    pub fn size(&self) -> usize {
        self.memory.len()
    }

    /// Set the physical address mask for the width of the CPU's address bus.
    pub fn set_address_mask(&mut self, mask: u32) {
        self.address_mask = mask;
    }

    pub fn address_mask(&self) -> u32 {
        self.address_mask
    }

    /// Add a memory-mapped device. Returns the device id.
    pub fn add_mmio_device(&mut self, device: Box<dyn MmioDevice>) -> usize {
        let (base, len) = device.mapping();
        let id = self.mmio_devices.len();
        log::debug!("Installing MMIO device {} at {:08X}-{:08X}", id, base, base.wrapping_add(len).wrapping_sub(1));
        self.mmio_map.push((base, len, id));
        self.mmio_devices.push(device);
        id
    }

    /// Mark a 4K page as not present. Accesses touching the page raise a page fault.
    pub fn set_page_fault(&mut self, address: u32, state: bool) {
        let page = address >> PAGE_SHIFT;
        if state {
            self.fault_pages.insert(page);
        }
        else {
            self.fault_pages.remove(&page);
        }
    }

    /// Returns true if any byte in [address, address + size) lies in a not-present page.
    pub fn is_page_fault(&self, address: u32, size: u32) -> bool {
        if self.fault_pages.is_empty() {
            return false;
        }
        let first = address >> PAGE_SHIFT;
        let last = address.wrapping_add(size.saturating_sub(1)) >> PAGE_SHIFT;
        self.fault_pages.contains(&first) || self.fault_pages.contains(&last)
    }
}
