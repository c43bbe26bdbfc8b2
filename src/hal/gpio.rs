//! Raspberry Pi GPIO lines.
//!
//! Push buttons are wired normally-open to ground, so inputs use the internal pull-up and
//! read active low. The LED output polarity is configurable.

use rppal::gpio::{Gpio, InputPin, OutputPin};
use tracing::debug;

use super::{HalError, InputLine, OutputLine};

fn open(pin: u8) -> Result<rppal::gpio::Pin, HalError> {
    Gpio::new()
        .and_then(|gpio| gpio.get(pin))
        .map_err(|e| HalError::Open {
            pin,
            reason: e.to_string(),
        })
}

pub struct GpioButton {
    name: String,
    pin: InputPin,
}

impl GpioButton {
    pub fn open(name: impl Into<String>, pin: u8) -> Result<Self, HalError> {
        let name = name.into();
        debug!("Opening button '{}' on GPIO{}", name, pin);
        Ok(Self {
            name,
            pin: open(pin)?.into_input_pullup(),
        })
    }
}

impl InputLine for GpioButton {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_active(&mut self) -> Result<bool, HalError> {
        Ok(self.pin.is_low())
    }
}

pub struct GpioLed {
    name: String,
    pin: OutputPin,
    active_high: bool,
    on: bool,
}

impl GpioLed {
    pub fn open(name: impl Into<String>, pin: u8, active_high: bool) -> Result<Self, HalError> {
        let name = name.into();
        debug!(
            "Opening LED '{}' on GPIO{} (active {})",
            name,
            pin,
            if active_high { "high" } else { "low" }
        );
        Ok(Self {
            name,
            pin: open(pin)?.into_output(),
            active_high,
            on: false,
        })
    }
}

impl OutputLine for GpioLed {
    fn name(&self) -> &str {
        &self.name
    }

    fn set(&mut self, on: bool) -> Result<(), HalError> {
        if on == self.active_high {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        self.on = on;
        Ok(())
    }

    fn is_on(&self) -> bool {
        self.on
    }
}
