//! Room panels with set point control (A5-10-xx).
//!
//! Set points go out as a 4BS telegram `00 1F <sp> 08` scaled on a 10 K range
//! around `base`; reported set points are read back on the configured range.
//! When a panel reports a set point away from the target (someone turned the
//! dial), that set point becomes the new target and is sent again.

use log::{debug, info};

use enocean_protocol::{
    DeviceId, EepKey, FieldValue, ProtocolError, RadioPacket, Registry, Rorg, SetpointRaw,
    SetpointScale,
};

use super::{Device, DeviceEvent};

/// Set point base when none is configured.
pub const DEFAULT_BASE: f64 = 20.0;

/// Highest accepted set point.
pub const MAX_TEMP: f64 = 30.5;

/// Lowest accepted set point, below `base`.
const MIN_TEMP_BELOW_BASE: f64 = 10.0;

/// Drift between reported and target set point that triggers a resend.
pub const DEFAULT_TOLERANCE: f64 = 0.5;

const EEP: EepKey = EepKey::new(Rorg::Bs4, 0x10, 0x03);

pub struct Thermostat {
    id: DeviceId,
    name: String,
    sender: Option<DeviceId>,
    send_scale: SetpointScale,
    report_scale: SetpointScale,
    tolerance: f64,
    target: Option<f64>,
    current: Option<f64>,
    resend: Option<f64>,
}

impl Thermostat {
    pub fn new(
        id: DeviceId,
        name: String,
        sender: Option<DeviceId>,
        base: f64,
        report_range: f64,
    ) -> Self {
        Self {
            id,
            name,
            sender,
            send_scale: SetpointScale::for_sending(base),
            report_scale: SetpointScale::new(base, report_range),
            tolerance: DEFAULT_TOLERANCE,
            target: None,
            current: None,
            resend: None,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn sender(&self) -> Option<DeviceId> {
        self.sender
    }

    pub fn target(&self) -> Option<f64> {
        self.target
    }

    pub fn current(&self) -> Option<f64> {
        self.current
    }

    pub fn min_temp(&self) -> f64 {
        self.send_scale.base - MIN_TEMP_BELOW_BASE
    }

    pub fn max_temp(&self) -> f64 {
        MAX_TEMP
    }

    /// Build the set point telegram for `temperature`.
    ///
    /// Temperatures outside `min_temp()..=max_temp()` are rejected.
    pub fn set_temperature(
        &mut self,
        temperature: f64,
        sender: DeviceId,
    ) -> Result<(RadioPacket, SetpointRaw), ProtocolError> {
        if !(self.min_temp()..=self.max_temp()).contains(&temperature) {
            return Err(ProtocolError::InvalidValue {
                field: "SP".to_string(),
                reason: format!(
                    "{} outside {}..={}",
                    temperature,
                    self.min_temp(),
                    self.max_temp()
                ),
            });
        }

        let setpoint = self.send_scale.encode(temperature);
        info!(
            "{}: set temperature to {} (raw {})",
            self.name, temperature, setpoint.raw
        );
        let payload = [0x00, 0x1F, setpoint.raw, 0x08];
        let packet =
            RadioPacket::create(Rorg::Bs4, &payload, sender, DeviceId::BROADCAST)?.without_optional();
        self.target = Some(temperature);
        Ok((packet, setpoint))
    }
}

impl Device for Thermostat {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn eep(&self) -> EepKey {
        EEP
    }

    fn command_sender(&self) -> Option<DeviceId> {
        self.sender
    }

    fn has_command(&self) -> bool {
        self.resend.is_some()
    }

    fn take_command(&mut self, sender: DeviceId) -> Result<Option<RadioPacket>, ProtocolError> {
        match self.resend.take() {
            Some(temperature) => Ok(Some(self.set_temperature(temperature, sender)?.0)),
            None => Ok(None),
        }
    }

    fn handle(
        &mut self,
        packet: &RadioPacket,
        registry: &Registry,
    ) -> Result<Option<DeviceEvent>, ProtocolError> {
        if packet.rorg() != Rorg::Bs4 {
            return Ok(None);
        }
        if packet.is_learn() {
            info!("{}: teach-in telegram", self.name);
            return Ok(None);
        }

        let decoded = registry.decode(EEP, packet.payload())?;
        let raw_setpoint = decoded.raw("SP").unwrap_or_default();
        let set_point = self.report_scale.decode(raw_setpoint as u8);
        let temperature = match decoded.get("TMP").map(|f| f.value) {
            Some(FieldValue::Scaled(t)) => t,
            _ => return Ok(None),
        };

        debug!(
            "{}: temperature {:.1}, set point {:.1}",
            self.name, temperature, set_point
        );
        self.current = Some(temperature);

        match self.target {
            Some(target) if (set_point - target).abs() > self.tolerance => {
                let adopted = set_point.clamp(self.min_temp(), self.max_temp());
                info!(
                    "{}: panel set point {:.1} differs from {:.1}, resending",
                    self.name, set_point, target
                );
                self.target = Some(adopted);
                self.resend = Some(adopted);
            }
            Some(_) => {}
            None => self.target = Some(set_point),
        }

        Ok(Some(DeviceEvent::Climate {
            set_point,
            temperature,
        }))
    }
}
