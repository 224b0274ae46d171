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

    bus::io.rs

    Implements the IO port map and dispatch of port reads and writes to devices.

*/

use std::ops::RangeInclusive;

use crate::bus::{BusInterface, IoDevice, IoDeviceStats, IoDeviceType, DEVICE_DESC_LEN, NO_IO_BYTE};

impl BusInterface {
    /// Install a handler for a range of ports. Existing mappings in the range are replaced.
    pub fn install_io_handler(&mut self, ports: RangeInclusive<u16>, device_type: IoDeviceType, desc: &str) {
        log::debug!(
            "Installing IO handler {:?} for ports {:04X}-{:04X}",
            device_type,
            ports.start(),
            ports.end()
        );
        for port in ports {
            self.io_map.insert(port, device_type);
            self.io_desc_map.insert(port, desc.to_string());
        }
    }

    /// Remove a handler from a range of ports. Ports mapped to another device are untouched.
    pub fn remove_io_handler(&mut self, ports: RangeInclusive<u16>, device_type: IoDeviceType) {
        let mut removed = 0;
        for port in ports.clone() {
            if self.io_map.get(&port) == Some(&device_type) {
                self.io_map.remove(&port);
                self.io_desc_map.remove(&port);
                removed += 1;
            }
        }
        if removed > 0 {
            log::debug!(
                "Removed IO handler {:?} from ports {:04X}-{:04X}",
                device_type,
                ports.start(),
                ports.end()
            );
        }
    }

    /// Attach an external device and map every port it reports. Returns the device id.
    pub fn add_io_device(&mut self, device: Box<dyn IoDevice>) -> usize {
        let id = self.io_devices.len();
        let port_list = device.port_list();
        self.io_desc_map.extend(port_list.iter().map(|p| (p.1, p.0.clone())));
        self.io_map
            .extend(port_list.into_iter().map(|p| (p.1, IoDeviceType::External(id))));
        self.io_devices.push(device);
        id
    }

    #[inline]
    pub fn io_device_type(&self, port: u16) -> Option<IoDeviceType> {
        self.io_map.get(&port).copied()
    }

    /// Read an 8-bit value from an external device port. Unmapped ports read NO_IO_BYTE.
    pub fn io_read_u8(&mut self, port: u16, cycles: u32) -> u8 {
        let mut byte = None;
        if let Some(IoDeviceType::External(id)) = self.io_map.get(&port) {
            if let Some(device) = self.io_devices.get_mut(*id) {
                byte = Some(device.read_u8(port, cycles));
            }
        }
        let byte_val = byte.unwrap_or(NO_IO_BYTE);
        self.record_io_read(port, byte_val, byte.is_some());
        byte_val
    }

    /// Write an 8-bit value to an external device port. Writes to unmapped ports are dropped.
    pub fn io_write_u8(&mut self, port: u16, data: u8, cycles: u32) {
        let mut resolved = false;
        if let Some(IoDeviceType::External(id)) = self.io_map.get(&port) {
            if let Some(device) = self.io_devices.get_mut(*id) {
                device.write_u8(port, data, cycles);
                resolved = true;
            }
        }
        self.record_io_write(port, data, resolved);
    }

    /// Return the wait cycles for an access to an external device port.
    pub fn io_wait(&mut self, port: u16, write: bool) -> u32 {
        if let Some(IoDeviceType::External(id)) = self.io_map.get(&port) {
            if let Some(device) = self.io_devices.get_mut(*id) {
                return if write {
                    device.write_wait(port)
                }
                else {
                    device.read_wait(port)
                };
            }
        }
        0
    }

    pub fn record_io_read(&mut self, port: u16, byte: u8, resolved: bool) {
        self.io_stats
            .entry(port)
            .and_modify(|e| {
                e.1.last_read = byte;
                e.1.reads += 1;
                e.1.reads_dirty = true;
            })
            .or_insert((resolved, IoDeviceStats { last_read: byte, ..IoDeviceStats::one_read() }));
    }

    pub fn record_io_write(&mut self, port: u16, byte: u8, resolved: bool) {
        self.io_stats
            .entry(port)
            .and_modify(|e| {
                e.1.last_write = byte;
                e.1.writes += 1;
                e.1.writes_dirty = true;
            })
            .or_insert((resolved, IoDeviceStats { last_write: byte, ..IoDeviceStats::one_write() }));
    }

    /// Run every attached device for the given number of CPU cycles.
    pub fn run_devices(&mut self, cycles: u32) {
        for device in self.io_devices.iter_mut() {
            device.run(cycles);
        }
    }

    /// Format the IO statistics table, one line per port, sorted by port number. Ports with
    /// no handler are flagged with '*'.
    pub fn dump_io_stats(&self) -> Vec<String> {
        let mut lines: Vec<_> = self
            .io_stats
            .iter()
            .map(|(port, stats)| {
                let mut port_desc = self.io_desc_map.get(port).cloned().unwrap_or_default();
                if port_desc.len() > DEVICE_DESC_LEN {
                    port_desc.truncate(DEVICE_DESC_LEN);
                }
                else {
                    port_desc = format!("{:width$}", port_desc, width = DEVICE_DESC_LEN);
                }
                (
                    *port,
                    format!(
                        "{:04X}{}: {} [{:02X}] {}, {}",
                        port,
                        if stats.0 { " " } else { "*" },
                        port_desc,
                        stats.1.last_read,
                        stats.1.reads,
                        stats.1.writes
                    ),
                )
            })
            .collect();

        lines.sort_by(|a, b| a.0.cmp(&b.0));
        lines.into_iter().map(|(_, line)| line).collect()
    }

    pub fn io_stats(&self, port: u16) -> Option<IoDeviceStats> {
        self.io_stats.get(&port).map(|s| s.1)
    }

    pub fn reset_io_stats(&mut self) {
        for (_, stats) in self.io_stats.iter_mut() {
            stats.1.last_read = 0;
            stats.1.last_write = 0;
            stats.1.reads = 0;
            stats.1.writes = 0;
            stats.1.reads_dirty = false;
            stats.1.writes_dirty = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scratch {
        value: u8,
        ticks: u32,
    }

    impl IoDevice for Scratch {
        fn read_u8(&mut self, _port: u16, _cycles: u32) -> u8 {
            self.value
        }
        fn write_u8(&mut self, _port: u16, data: u8, _cycles: u32) {
            self.value = data;
        }
        fn run(&mut self, cycles: u32) {
            self.ticks += cycles;
        }
        fn port_list(&self) -> Vec<(String, u16)> {
            vec![("Scratch Register".to_string(), 0x80)]
        }
    }

    #[test]
    fn test_external_device() {
        let mut bus = BusInterface::default();
        bus.add_io_device(Box::new(Scratch { value: 0, ticks: 0 }));
        bus.io_write_u8(0x80, 0x55, 0);
        assert_eq!(bus.io_read_u8(0x80, 0), 0x55);
        assert_eq!(bus.io_read_u8(0x81, 0), NO_IO_BYTE);
        assert_eq!(bus.io_stats(0x80).unwrap().reads, 1);
        assert_eq!(bus.io_stats(0x80).unwrap().writes, 1);

        let lines = bus.dump_io_stats();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("0081*"));
    }

    #[test]
    fn test_install_remove() {
        let mut bus = BusInterface::default();
        bus.install_io_handler(0x22..=0x23, IoDeviceType::CyrixConfig, "Cyrix Configuration");
        assert_eq!(bus.io_device_type(0x23), Some(IoDeviceType::CyrixConfig));
        // Removing a different owner leaves the mapping alone.
        bus.remove_io_handler(0x22..=0x23, IoDeviceType::FpuControl);
        assert_eq!(bus.io_device_type(0x22), Some(IoDeviceType::CyrixConfig));
        bus.remove_io_handler(0x22..=0x23, IoDeviceType::CyrixConfig);
        assert_eq!(bus.io_device_type(0x22), None);
    }
}
