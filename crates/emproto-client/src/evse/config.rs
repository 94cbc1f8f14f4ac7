//! Configuration fetch and setters.
//!
//! Every config item shares one request layout: `payload[0]` selects set
//! (0x01) or get (0x02) and the rest carries the value. The response
//! command is the request command minus 0x8000.

use super::{Evse, RESPONSE_TIMEOUT};
use emproto_codec::{Command, Datagram};
use emproto_types::{Amps, EmError, EmResult, EventKind, Language, TemperatureUnit};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Config GETs are answered noticeably slower than other requests.
const CONFIG_GET_TIMEOUT: Duration = Duration::from_secs(8);

const SET: u8 = 0x01;
const GET: u8 = 0x02;

impl Evse {
    /// Fetch all configuration items unless they were fetched less than
    /// `max_age` ago. The individual GETs run in parallel; responses are
    /// applied by the config handler. Partial failures are collected into
    /// one error naming the fields that failed.
    pub async fn fetch_config(&self, max_age: Duration) -> EmResult<()> {
        {
            let session = self.session.lock().unwrap();
            if let Some(fetched) = session.config_fetched {
                if fetched.elapsed() < max_age {
                    return Ok(());
                }
            }
        }
        if !self.is_logged_in() {
            return Err(EmError::NotLoggedIn {
                serial: self.serial().clone(),
            });
        }

        let results = tokio::join!(
            self.config_get("name", Command::SET_GET_NAME, 32),
            self.config_get("language", Command::SET_GET_LANGUAGE, 1),
            self.config_get("temperature_unit", Command::SET_GET_TEMPERATURE_UNIT, 1),
            self.config_get("offline_charge", Command::SET_GET_OFFLINE_CHARGE, 1),
            self.config_get("max_current", Command::SET_GET_MAX_CURRENT, 1),
        );
        let failed: Vec<String> = [results.0, results.1, results.2, results.3, results.4]
            .into_iter()
            .filter_map(|result| result.err())
            .collect();

        if failed.is_empty() {
            self.session.lock().unwrap().config_fetched = Some(Instant::now());
            Ok(())
        } else {
            Err(EmError::ConfigFetch {
                serial: self.serial().clone(),
                fields: failed,
            })
        }
    }

    async fn config_get(
        &self,
        name: &str,
        command: Command,
        value_len: usize,
    ) -> Result<(), String> {
        let result: EmResult<()> = async {
            let mut payload = vec![0u8; 1 + value_len];
            payload[0] = GET;
            self.send_datagram(Datagram::new(command, payload)).await?;
            self.wait_for(CONFIG_GET_TIMEOUT, &[command.response()])
                .await?;
            Ok(())
        }
        .await;
        result.map_err(|err| {
            debug!(serial = %self.serial(), %err, "failed to get config item {name}");
            format!("{name}: {err}")
        })
    }

    async fn config_set(&self, command: Command, value: &[u8]) -> EmResult<()> {
        if !self.is_logged_in() {
            return Err(EmError::NotLoggedIn {
                serial: self.serial().clone(),
            });
        }
        let mut payload = vec![0u8; 1 + value.len()];
        payload[0] = SET;
        payload[1..].copy_from_slice(value);
        self.send_datagram(Datagram::new(command, payload)).await?;
        self.wait_for(RESPONSE_TIMEOUT, &[command.response()])
            .await?;
        Ok(())
    }

    /// Set the configured name. Non-ASCII characters are dropped and the
    /// result truncated to 11 bytes; the wire value carries the vendor's
    /// `ACP#` prefix in a fixed 32-byte field.
    pub async fn set_name(&self, name: &str) -> EmResult<()> {
        let ascii: Vec<u8> = name
            .bytes()
            .filter(|b| b.is_ascii())
            .take(11)
            .collect();
        let mut value = [0u8; 32];
        value[..4].copy_from_slice(b"ACP#");
        value[4..4 + ascii.len()].copy_from_slice(&ascii);

        self.config_set(Command::SET_GET_NAME, &value).await?;
        self.config.write().await.name = String::from_utf8_lossy(&ascii).into_owned();
        self.queue_event(EventKind::EvseConfigUpdated);
        Ok(())
    }

    /// Set the configured display language.
    pub async fn set_language(&self, language: Language) -> EmResult<()> {
        self.config_set(Command::SET_GET_LANGUAGE, &[language.as_byte()])
            .await?;
        self.config.write().await.language = language;
        self.queue_event(EventKind::EvseConfigUpdated);
        Ok(())
    }

    /// Set the configured temperature unit.
    pub async fn set_temperature_unit(&self, unit: TemperatureUnit) -> EmResult<()> {
        self.config_set(Command::SET_GET_TEMPERATURE_UNIT, &[unit.as_byte()])
            .await?;
        self.config.write().await.temperature_unit = unit;
        self.queue_event(EventKind::EvseConfigUpdated);
        Ok(())
    }

    /// Enable or disable starting a charge at the EVSE itself. The wire
    /// value is inverted: enabled writes 0x00.
    pub async fn set_offline_charge(&self, enabled: bool) -> EmResult<()> {
        let value = if enabled { 0x00 } else { 0x01 };
        self.config_set(Command::SET_GET_OFFLINE_CHARGE, &[value])
            .await?;
        self.config.write().await.offline_charge = enabled;
        self.queue_event(EventKind::EvseConfigUpdated);
        Ok(())
    }

    /// Set the configured maximum current in whole amperes.
    pub async fn set_max_current(&self, max_current: Amps) -> EmResult<()> {
        self.config_set(Command::SET_GET_MAX_CURRENT, &[max_current as u8])
            .await?;
        self.config.write().await.max_current = max_current;
        self.queue_event(EventKind::EvseConfigUpdated);
        Ok(())
    }
}
