#[cfg(test)]
mod tests {
    use crate::{ClockPacer, LedPanel, System};
    use color_eyre::eyre::Result;
    use memory::Rom;
    use std::time::Instant;

    #[test]
    fn pacer_zero_rate_never_sleeps() {
        let mut pacer = ClockPacer::new(0);
        let start = Instant::now();
        for _ in 0..10_000 {
            pacer.pace();
        }
        assert!(
            start.elapsed().as_millis() < 500,
            "unpaced loop took {}ms",
            start.elapsed().as_millis()
        );
    }

    #[test]
    fn pacer_holds_the_schedule() {
        // 1 kHz for 50 cycles is at least 50ms of wall clock.
        let mut pacer = ClockPacer::new(1_000);
        let start = Instant::now();
        for _ in 0..50 {
            pacer.pace();
        }
        assert!(
            start.elapsed().as_millis() >= 45,
            "paced loop finished in {}ms",
            start.elapsed().as_millis()
        );
    }

    #[test]
    fn led_panel_draws_on_change_only() -> Result<()> {
        let mut panel = LedPanel::new(Vec::new());

        panel.render(0x80, 0x01)?;
        panel.render(0x80, 0x01)?;
        let out = String::from_utf8(panel.into_inner())?;
        assert!(
            out.matches('\r').count() == 1,
            "redrew an unchanged panel: {out:?}"
        );
        assert!(out.contains("A \u{25cf}\u{25cb}\u{25cb}\u{25cb}\u{25cb}\u{25cb}\u{25cb}\u{25cb}"), "port A row wrong: {out:?}");
        assert!(out.contains("B \u{25cb}\u{25cb}\u{25cb}\u{25cb}\u{25cb}\u{25cb}\u{25cb}\u{25cf}"), "port B row wrong: {out:?}");
        Ok(())
    }

    #[test]
    fn system_wires_and_boots() -> Result<()> {
        let mut rom = Rom::new();
        // Spin in place.
        rom.load_bytes(&[0x4C, 0x00, 0x80], 0x8000);
        rom.load_bytes(&[0x00, 0x80], 0xFFFC);

        let mut system = System::new(rom, None)?;
        assert!(system.cpu.pc.0 == 0x8000, "reset vector not taken");
        for _ in 0..30 {
            system.cpu.step()?;
        }
        assert!(system.cpu.pc.0 >= 0x8000, "ran off the program");
        assert!(system.via.borrow().port_b_output() == 0, "port B moved");
        Ok(())
    }
}
