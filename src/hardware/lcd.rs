//! HD44780 character LCD behind a PCF8574 I2C expander.
//!
//! Expander bit layout: P0 = RS, P1 = RW, P2 = E, P3 = backlight,
//! P4..P7 = D4..D7. The controller runs in 4-bit mode, so every byte is sent
//! as two strobed nibbles.

use std::{thread, time::Duration};

use embedded_hal::i2c::I2c;

use super::{CharacterDisplay, hw_err};
use crate::error::Result;

const RS: u8 = 0b0000_0001;
const ENABLE: u8 = 0b0000_0100;
const BACKLIGHT: u8 = 0b0000_1000;

const CMD_CLEAR: u8 = 0x01;
const CMD_ENTRY_MODE: u8 = 0x06;
const CMD_DISPLAY_ON: u8 = 0x0C;
const CMD_FUNCTION_4BIT_2LINE: u8 = 0x28;
const CMD_SET_DDRAM: u8 = 0x80;

/// DDRAM start address of each row.
const ROW_OFFSETS: [u8; 2] = [0x00, 0x40];

#[derive(Debug)]
pub struct Hd44780<I> {
    bus: I,
    address: u8,
    columns: usize,
    backlight: bool,
}

impl<I: I2c> Hd44780<I> {
    /// Runs the 4-bit initialisation sequence and blanks the screen.
    pub fn new(bus: I, address: u8, columns: usize) -> Result<Self> {
        let mut lcd = Self {
            bus,
            address,
            columns,
            backlight: true,
        };
        lcd.init()?;
        Ok(lcd)
    }

    fn init(&mut self) -> Result<()> {
        thread::sleep(Duration::from_millis(50));
        // Three 8-bit function sets resynchronise the controller whatever
        // mode it was left in, then switch to 4-bit.
        for delay_us in [4500, 4500, 150] {
            self.write_nibble(0x30, 0)?;
            thread::sleep(Duration::from_micros(delay_us));
        }
        self.write_nibble(0x20, 0)?;

        self.command(CMD_FUNCTION_4BIT_2LINE)?;
        self.command(CMD_DISPLAY_ON)?;
        self.command(CMD_CLEAR)?;
        thread::sleep(Duration::from_millis(2));
        self.command(CMD_ENTRY_MODE)
    }

    fn expander_write(&mut self, data: u8) -> Result<()> {
        let data = if self.backlight { data | BACKLIGHT } else { data };
        self.bus
            .write(self.address, &[data])
            .map_err(|e| hw_err("lcd write", e))
    }

    fn write_nibble(&mut self, high_nibble: u8, mode: u8) -> Result<()> {
        let data = (high_nibble & 0xF0) | mode;
        self.expander_write(data | ENABLE)?;
        self.expander_write(data)
    }

    fn send(&mut self, value: u8, mode: u8) -> Result<()> {
        self.write_nibble(value & 0xF0, mode)?;
        self.write_nibble(value << 4, mode)
    }

    fn command(&mut self, cmd: u8) -> Result<()> {
        self.send(cmd, 0)
    }

    fn set_row(&mut self, row: usize) -> Result<()> {
        let offset = ROW_OFFSETS[row.min(ROW_OFFSETS.len() - 1)];
        self.command(CMD_SET_DDRAM | offset)
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        for ch in text.chars().take(self.columns) {
            // ROM A00 covers printable ASCII; everything else shows as '?'.
            let byte = if ch.is_ascii() && !ch.is_ascii_control() {
                ch as u8
            } else {
                b'?'
            };
            self.send(byte, RS)?;
        }
        Ok(())
    }
}

impl<I> CharacterDisplay for Hd44780<I>
where
    I: I2c + Send + std::fmt::Debug,
{
    fn columns(&self) -> usize {
        self.columns
    }

    fn clear(&mut self) -> Result<()> {
        self.command(CMD_CLEAR)?;
        thread::sleep(Duration::from_millis(2));
        Ok(())
    }

    fn show(&mut self, line1: &str, line2: &str) -> Result<()> {
        self.clear()?;
        self.set_row(0)?;
        self.write_text(line1)?;
        if !line2.is_empty() {
            self.set_row(1)?;
            self.write_text(line2)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorType, Operation};
    use pretty_assertions::assert_eq;
    use std::convert::Infallible;

    #[derive(Debug, Default)]
    struct RecordingBus {
        writes: Vec<(u8, Vec<u8>)>,
    }

    impl ErrorType for RecordingBus {
        type Error = Infallible;
    }

    impl I2c for RecordingBus {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> std::result::Result<(), Self::Error> {
            for op in operations {
                if let Operation::Write(bytes) = op {
                    self.writes.push((address, bytes.to_vec()));
                }
            }
            Ok(())
        }
    }

    /// Rebuilds the (mode, byte) pairs from strobed nibble writes.
    fn decode(writes: &[(u8, Vec<u8>)]) -> Vec<(u8, u8)> {
        let strobes: Vec<u8> = writes
            .iter()
            .map(|(_, b)| b[0])
            .filter(|b| b & ENABLE != 0)
            .collect();
        strobes
            .chunks(2)
            .filter(|pair| pair.len() == 2)
            .map(|pair| (pair[0] & RS, (pair[0] & 0xF0) | (pair[1] >> 4)))
            .collect()
    }

    fn lcd() -> Hd44780<RecordingBus> {
        let mut lcd = Hd44780::new(RecordingBus::default(), 0x27, 16).unwrap();
        lcd.bus.writes.clear();
        lcd
    }

    #[test]
    fn init_addresses_the_backpack_with_backlight() {
        let lcd = Hd44780::new(RecordingBus::default(), 0x27, 16).unwrap();

        assert!(lcd.bus.writes.iter().all(|(addr, _)| *addr == 0x27));
        assert!(lcd.bus.writes.iter().all(|(_, b)| b[0] & BACKLIGHT != 0));
        // 4 single-nibble resync writes, then 4 commands of 2 nibbles,
        // each nibble strobed high then low.
        assert_eq!(lcd.bus.writes.len(), (4 + 4 * 2) * 2);
    }

    #[test]
    fn show_writes_both_rows() {
        let mut lcd = lcd();
        lcd.show("AB", "C").unwrap();

        let sent = decode(&lcd.bus.writes);
        assert_eq!(
            sent,
            vec![
                (0, CMD_CLEAR),
                (0, CMD_SET_DDRAM),
                (RS, b'A'),
                (RS, b'B'),
                (0, CMD_SET_DDRAM | 0x40),
                (RS, b'C'),
            ]
        );
    }

    #[test]
    fn show_skips_empty_second_row() {
        let mut lcd = lcd();
        lcd.show("A", "").unwrap();

        let sent = decode(&lcd.bus.writes);
        assert_eq!(sent.len(), 3);
    }

    #[test]
    fn text_is_cut_to_width_and_non_ascii_replaced() {
        let mut lcd = Hd44780::new(RecordingBus::default(), 0x27, 3).unwrap();
        lcd.bus.writes.clear();
        lcd.show("é1234", "").unwrap();

        let chars: Vec<u8> = decode(&lcd.bus.writes)
            .into_iter()
            .filter(|(mode, _)| *mode == RS)
            .map(|(_, b)| b)
            .collect();
        assert_eq!(chars, b"?12".to_vec());
    }
}
