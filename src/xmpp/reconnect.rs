/*
** This file is a part of fxmpp-core (XMPP client core library)
** Copyright (C) 2000-2025 Gurer Ozen
**
** fxmpp-core is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

//! Retrying connections with exponential backoff.
//!
//! The client never reconnects by itself. Applications that want to
//! come back after a lost connection run a [ReconnectPolicy] when the
//! `ConnectionLost` state event arrives.

use std::time::Duration;

use serde::Deserialize;
use tracing::info;
use tracing::warn;

use super::ConnectionConfig;
use super::Connector;
use super::XmppClient;
use super::XmppError;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2,
            max_attempts: Some(10),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given retry, counting from 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .max(1)
            .saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Errors the user has to fix are never retried.
    pub fn should_retry(&self, error: &XmppError, attempt: u32) -> bool {
        if matches!(
            error,
            XmppError::AuthFailed { .. } | XmppError::InvalidArgument(_)
        ) {
            return false;
        }
        self.max_attempts.is_none_or(|max| attempt < max)
    }

    /// Connects, retrying failed attempts after the backoff delay.
    /// Returns the last error when giving up.
    pub async fn connect<C: Connector>(
        &self,
        client: &XmppClient<C>,
        config: &ConnectionConfig,
    ) -> Result<(), XmppError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match client.connect(config.clone()).await {
                Ok(()) => {
                    if attempt > 1 {
                        info!(attempt, "reconnected");
                    }
                    return Ok(());
                }
                Err(error) => error,
            };
            if !self.should_retry(&error, attempt) {
                return Err(error);
            }
            let delay = self.delay(attempt);
            warn!(%error, attempt, ?delay, "connection attempt failed, retrying");
            tokio::time::sleep(delay).await;
        }
    }
}
