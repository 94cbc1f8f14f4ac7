//! Login flow, auto-login and the version/info fetch.

use super::{Evse, AUTO_LOGIN_RETRY, RESPONSE_TIMEOUT};
use emproto_codec::{Command, Datagram};
use emproto_types::{EmError, EmResult, EventKind, Password};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

impl Evse {
    /// Store a password for this EVSE.
    ///
    /// When the EVSE is online this attempts a (re-)login right away and
    /// only keeps the password on success; when offline the password is
    /// stored and used automatically once the EVSE is discovered.
    pub async fn use_password(&self, password: Password) -> EmResult<()> {
        if !self.is_online() {
            self.session.lock().unwrap().password = password;
            return Ok(());
        }
        self.login(Some(password)).await
    }

    /// Run the login handshake. With `None` the stored password is used.
    ///
    /// On success the password is stored, the login window refreshed, and
    /// info/charge/config refetched in the background.
    pub async fn login(&self, password: Option<Password>) -> EmResult<()> {
        let password = match password {
            Some(password) if password.is_set() => password,
            _ => {
                let stored = self.session.lock().unwrap().password.clone();
                if !stored.is_set() {
                    return Err(EmError::NoPassword {
                        serial: self.serial().clone(),
                    });
                }
                stored
            }
        };

        let request = Datagram::new(Command::REQUEST_LOGIN, vec![0x00])
            .with_password(password.clone());
        self.send_datagram(request).await?;

        let response = self
            .wait_for(
                RESPONSE_TIMEOUT,
                &[Command::LOGIN_RESPONSE, Command::PASSWORD_ERROR],
            )
            .await?;
        if response.command == Command::PASSWORD_ERROR {
            return Err(EmError::InvalidPassword {
                serial: self.serial().clone(),
            });
        }

        self.session.lock().unwrap().password = password;
        self.send_datagram(Datagram::new(Command::LOGIN_CONFIRM, vec![0x00]))
            .await?;

        let was_logged_in = {
            let mut session = self.session.lock().unwrap();
            let was = session.is_logged_in();
            session.last_active_login = Some(Instant::now());
            was
        };
        if !was_logged_in {
            self.queue_event(EventKind::EvseLoggedIn);
        }

        // Refresh all three sections right after login, best effort.
        self.spawn_fetch("info", |evse| async move {
            evse.fetch_info(Duration::ZERO).await
        });
        self.spawn_fetch("charge", |evse| async move {
            evse.fetch_charge(Duration::ZERO).await
        });
        self.spawn_fetch("config", |evse| async move {
            evse.fetch_config(Duration::ZERO).await
        });

        Ok(())
    }

    /// Try to log in while a password is stored, the EVSE is online and no
    /// session is active; retries on a fixed delay until one of those
    /// conditions changes or a login succeeds.
    pub(crate) async fn auto_login(&self) {
        loop {
            let password = self.session.lock().unwrap().password.clone();
            if !password.is_set() || !self.is_online() || self.is_logged_in() {
                return;
            }
            match self.login(Some(password)).await {
                Ok(()) => {
                    debug!(serial = %self.serial(), "auto-login successful");
                    return;
                }
                Err(err) => {
                    warn!(serial = %self.serial(), %err, "auto-login failed, will retry");
                    tokio::time::sleep(AUTO_LOGIN_RETRY).await;
                }
            }
        }
    }

    /// Fetch version/info data unless it was fetched less than `max_age`
    /// ago. The response is applied by the version handler.
    pub async fn fetch_info(&self, max_age: Duration) -> EmResult<()> {
        {
            let session = self.session.lock().unwrap();
            if let Some(fetched) = session.info_fetched {
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
        self.send_datagram(Datagram::new(Command::GET_VERSION, vec![]))
            .await?;
        self.wait_for(RESPONSE_TIMEOUT, &[Command::GET_VERSION_RESPONSE])
            .await?;
        Ok(())
    }
}
