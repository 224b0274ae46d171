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

    bus::memory.rs

    Physical memory access. Accesses are masked to the CPU's address bus width, routed to
    a memory-mapped device if one claims the address, and otherwise served from RAM.
    Reads beyond the end of installed memory return open bus.

*/

use crate::bus::{BusInterface, OPEN_BUS_BYTE};

impl BusInterface {
    #[inline]
    fn mmio_device_for(&self, address: u32) -> Option<usize> {
        self.mmio_map
            .iter()
            .find(|(base, len, _)| address >= *base && address - *base < *len)
            .map(|(_, _, id)| *id)
    }

    pub fn read_u8(&mut self, address: u32) -> u8 {
        let address = address & self.address_mask;
        if !self.mmio_map.is_empty() {
            if let Some(id) = self.mmio_device_for(address) {
                return self.mmio_devices[id].mmio_read_u8(address);
            }
        }
        self.memory.get(address as usize).copied().unwrap_or(OPEN_BUS_BYTE)
    }

    pub fn write_u8(&mut self, address: u32, data: u8) {
        let address = address & self.address_mask;
        if !self.mmio_map.is_empty() {
            if let Some(id) = self.mmio_device_for(address) {
                self.mmio_devices[id].mmio_write_u8(address, data);
                return;
            }
        }
        if let Some(byte) = self.memory.get_mut(address as usize) {
            *byte = data;
        }
    }

    pub fn read_u16(&mut self, address: u32) -> u16 {
        u16::from_le_bytes([self.read_u8(address), self.read_u8(address.wrapping_add(1))])
    }

    pub fn read_u32(&mut self, address: u32) -> u32 {
        let mut bytes = [0u8; 4];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = self.read_u8(address.wrapping_add(i as u32));
        }
        u32::from_le_bytes(bytes)
    }

    pub fn read_u64(&mut self, address: u32) -> u64 {
        let mut bytes = [0u8; 8];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = self.read_u8(address.wrapping_add(i as u32));
        }
        u64::from_le_bytes(bytes)
    }

    pub fn write_u16(&mut self, address: u32, data: u16) {
        for (i, b) in data.to_le_bytes().iter().enumerate() {
            self.write_u8(address.wrapping_add(i as u32), *b);
        }
    }

    pub fn write_u32(&mut self, address: u32, data: u32) {
        for (i, b) in data.to_le_bytes().iter().enumerate() {
            self.write_u8(address.wrapping_add(i as u32), *b);
        }
    }

    pub fn write_u64(&mut self, address: u32, data: u64) {
        for (i, b) in data.to_le_bytes().iter().enumerate() {
            self.write_u8(address.wrapping_add(i as u32), *b);
        }
    }

    /// Copy a slice into memory. Bytes beyond the end of memory are dropped.
    pub fn copy_from(&mut self, src: &[u8], address: usize) -> usize {
        if address >= self.memory.len() {
            return 0;
        }
        let len = src.len().min(self.memory.len() - address);
        self.memory[address..address + len].copy_from_slice(&src[..len]);
        len
    }

    /// Return a view of RAM.
    pub fn get_slice_at(&self, address: usize, len: usize) -> &[u8] {
        let start = address.min(self.memory.len());
        let end = address.saturating_add(len).min(self.memory.len());
        &self.memory[start..end]
    }

    /// Return true if the physical address falls in the legacy video aperture (A0000-BFFFF).
    #[inline]
    pub fn is_video_address(address: u32) -> bool {
        (0xA0000..0xC0000).contains(&address)
    }
}

#[cfg(test)]
mod tests {
    use crate::bus::{BusInterface, MmioDevice};

    struct Latch {
        value: u8,
    }

    impl MmioDevice for Latch {
        fn mmio_read_u8(&mut self, _address: u32) -> u8 {
            self.value
        }
        fn mmio_write_u8(&mut self, _address: u32, data: u8) {
            self.value = data.wrapping_add(1);
        }
        fn mapping(&self) -> (u32, u32) {
            (0xA0000, 0x100)
        }
    }

    #[test]
    fn test_memory_rw() {
        let mut bus = BusInterface::new(0x1000);
        bus.write_u32(0x10, 0xDEADBEEF);
        assert_eq!(bus.read_u8(0x10), 0xEF);
        assert_eq!(bus.read_u16(0x12), 0xDEAD);
        assert_eq!(bus.read_u32(0x10), 0xDEADBEEF);
        // Open bus beyond RAM.
        assert_eq!(bus.read_u8(0x2000), 0xFF);
    }

    #[test]
    fn test_address_mask() {
        let mut bus = BusInterface::new(0x100000);
        bus.set_address_mask(0xFFFFF);
        bus.write_u8(0x100005, 0x42);
        assert_eq!(bus.read_u8(0x5), 0x42);
    }

    #[test]
    fn test_mmio_hook() {
        let mut bus = BusInterface::new(0x100000);
        bus.add_mmio_device(Box::new(Latch { value: 0 }));
        bus.write_u8(0xA0010, 0x41);
        assert_eq!(bus.read_u8(0xA0000), 0x42);
        assert_eq!(bus.read_u8(0xA0100), 0x00);
    }

    #[test]
    fn test_page_fault_span() {
        let mut bus = BusInterface::new(0x10000);
        bus.set_page_fault(0x2000, true);
        assert!(bus.is_page_fault(0x1FFE, 4));
        assert!(!bus.is_page_fault(0x1FF0, 4));
        bus.set_page_fault(0x2000, false);
        assert!(!bus.is_page_fault(0x1FFE, 4));
    }
}
