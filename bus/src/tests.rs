#[cfg(test)]
mod tests {
    use crate::Bus;
    use chip::Peripheral;
    use color_eyre::eyre::Result;
    use memory::{Ram, Rom, RAM_SIZE, ROM_START};
    use std::cell::RefCell;
    use std::rc::Rc;
    use via::Via;

    fn bus_with_rom(data: &[u8], offset: u16) -> Bus {
        let mut rom = Rom::new();
        rom.load_bytes(data, offset);
        Bus::new(Ram::new(), rom)
    }

    #[test]
    fn ram_round_trip() -> Result<()> {
        let mut bus = Bus::new(Ram::new(), Rom::new());

        for addr in (0x0000..RAM_SIZE as u16).step_by(0x0401) {
            #[allow(clippy::cast_possible_truncation)]
            let val = (addr >> 3) as u8 ^ 0x5A;
            bus.write(addr, val)?;
            assert!(bus.read(addr)? == val, "mismatch at {addr:#06X}");
        }
        Ok(())
    }

    #[test]
    fn rom_reads_and_write_immunity() -> Result<()> {
        let mut bus = bus_with_rom(&[0xA9, 0x42], ROM_START);

        assert!(bus.read(0x8000)? == 0xA9, "ROM byte wrong");
        assert!(bus.read(0x8001)? == 0x42, "ROM byte wrong");

        // Writes to the ROM region are dropped, not errors.
        bus.write(0x8000, 0xFF)?;
        bus.write(0xFFFF, 0xFF)?;
        assert!(bus.read(0x8000)? == 0xA9, "ROM changed by write");
        assert!(bus.read(0xFFFF)? == 0x00, "ROM changed by write");
        Ok(())
    }

    #[test]
    fn unmapped_low_addresses_error() {
        let mut bus = Bus::new(Ram::new(), Rom::new());

        assert!(bus.read(0x4800).is_err(), "unmapped read succeeded");
        assert!(bus.write(0x7000, 0x01).is_err(), "unmapped write succeeded");
    }

    #[test]
    fn read_word_wraps() -> Result<()> {
        let mut bus = bus_with_rom(&[0x34], 0xFFFF);
        bus.write(0x0000, 0x12)?;

        // High byte comes from 0x0000 after the wrap.
        assert!(bus.read_word(0xFFFF)? == 0x1234, "word wrap wrong");

        bus.write(0x0100, 0xCD)?;
        bus.write(0x0101, 0xAB)?;
        assert!(bus.read_word(0x0100)? == 0xABCD, "little endian wrong");
        Ok(())
    }

    #[test]
    fn peripheral_priority_over_memory() -> Result<()> {
        // Park a VIA inside the ROM region: registration wins the claim.
        let mut bus = bus_with_rom(&[0xEE; 32], 0x9000);
        let v = Rc::new(RefCell::new(Via::new(0x9000)));
        bus.add_peripheral(v.clone());

        v.borrow_mut().write(0x9002, 0xFF)?; // DDRB all output
        bus.write(0x9000, 0x77)?;
        assert!(bus.read(0x9000)? == 0x77, "peripheral not routed first");
        // One past the device's range falls back to ROM.
        assert!(bus.read(0x9010)? == 0xEE, "fallback to ROM broken");
        Ok(())
    }

    #[test]
    fn irq_edges_fire_once_per_assertion() -> Result<()> {
        let mut bus = Bus::new(Ram::new(), Rom::new());
        let v = Rc::new(RefCell::new(Via::new(0x6000)));
        bus.add_peripheral(v.clone());

        // Enable T1 interrupts and start a 3 cycle one shot.
        bus.write(0x600E, 0xC0)?;
        bus.write(0x6004, 0x03)?;
        bus.write(0x6005, 0x00)?;

        let mut edges = 0;
        for _ in 0..10 {
            if bus.tick()? {
                edges += 1;
            }
        }
        assert!(edges == 1, "level held high produced {edges} edges");

        // Acknowledge, rearm: exactly one more edge.
        let _ = bus.read(0x6004)?;
        bus.write(0x6005, 0x00)?;
        let mut more = 0;
        for _ in 0..10 {
            if bus.tick()? {
                more += 1;
            }
        }
        assert!(more == 1, "rearmed line produced {more} edges");
        Ok(())
    }
}
