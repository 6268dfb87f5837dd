use crate::{config::PowerConfig, error::SensorReadError};

/// A single analog input returning raw ADC counts.
pub trait AnalogChannel {
    fn read_raw(&mut self) -> Result<u16, SensorReadError>;
}

impl<C: AnalogChannel + ?Sized> AnalogChannel for &mut C {
    fn read_raw(&mut self) -> Result<u16, SensorReadError> {
        (**self).read_raw()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdcCalibration {
    pub max_raw: u16,
    pub vref_v: f32,
}

impl Default for AdcCalibration {
    fn default() -> Self {
        Self {
            max_raw: 4095,
            vref_v: 3.3,
        }
    }
}

impl From<&PowerConfig> for AdcCalibration {
    fn from(power: &PowerConfig) -> Self {
        Self {
            max_raw: power.adc_max_raw,
            vref_v: power.adc_vref_v,
        }
    }
}

impl AdcCalibration {
    /// Linear scaling `raw / max_raw * vref`. Samples above `max_raw` are a
    /// driver fault and are rejected rather than clamped.
    pub fn to_voltage(&self, raw: u16) -> Result<f32, SensorReadError> {
        if raw > self.max_raw {
            return Err(SensorReadError::OutOfRange {
                raw,
                max: self.max_raw,
            });
        }
        Ok((raw as f32 / self.max_raw as f32) * self.vref_v)
    }
}

pub struct VoltageReader<C> {
    channel: C,
    calibration: AdcCalibration,
}

impl<C: AnalogChannel> VoltageReader<C> {
    pub fn new(channel: C, calibration: AdcCalibration) -> Self {
        Self {
            channel,
            calibration,
        }
    }

    pub fn calibration(&self) -> AdcCalibration {
        self.calibration
    }

    pub fn read_voltage(&mut self) -> Result<f32, SensorReadError> {
        let raw = self.channel.read_raw()?;
        self.calibration.to_voltage(raw)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    struct FixedChannel(Result<u16, SensorReadError>);

    impl AnalogChannel for FixedChannel {
        fn read_raw(&mut self) -> Result<u16, SensorReadError> {
            self.0.clone()
        }
    }

    #[test]
    fn scales_linearly_over_full_range() {
        let calibration = AdcCalibration::default();
        let mut previous = -1.0_f32;

        for raw in 0..=4095_u16 {
            let volts = calibration.to_voltage(raw).unwrap();
            let expected = (raw as f32 / 4095.0) * 3.3;
            assert!((volts - expected).abs() < 1e-6, "raw {raw}: {volts} != {expected}");
            assert!(volts >= previous, "not monotonic at raw {raw}");
            previous = volts;
        }

        assert_eq!(calibration.to_voltage(0), Ok(0.0));
        assert!((calibration.to_voltage(4095).unwrap() - 3.3).abs() < 1e-6);
    }

    #[test]
    fn rejects_samples_above_adc_max() {
        let calibration = AdcCalibration::default();
        assert_eq!(
            calibration.to_voltage(4096),
            Err(SensorReadError::OutOfRange {
                raw: 4096,
                max: 4095
            })
        );
    }

    #[test]
    fn reader_uses_its_own_calibration() {
        let calibration = AdcCalibration {
            max_raw: 1023,
            vref_v: 5.0,
        };
        let mut reader = VoltageReader::new(FixedChannel(Ok(1023)), calibration);
        assert!((reader.read_voltage().unwrap() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn reader_surfaces_hardware_faults() {
        let fault = SensorReadError::Hardware("timeout".to_string());
        let mut reader = VoltageReader::new(FixedChannel(Err(fault.clone())), Default::default());
        assert_eq!(reader.read_voltage(), Err(fault));
    }
}
