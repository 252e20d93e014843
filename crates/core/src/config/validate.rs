use super::{types::Config, ConfigError};

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    if config.queue.movie_max_size == 0 || config.queue.tv_max_size == 0 {
        return Err(invalid("queue sizes must be at least 1"));
    }
    if config.queue.promote_interval_secs == 0 {
        return Err(invalid("queue.promote_interval_secs cannot be 0"));
    }

    let retry = &config.retry;
    if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
        return Err(invalid("retry.backoff_multiplier must be >= 1.0"));
    }
    if retry.initial_delay_secs > retry.max_delay_secs {
        return Err(invalid(
            "retry.initial_delay_secs cannot exceed retry.max_delay_secs",
        ));
    }
    if retry.sweep_interval_secs == 0 {
        return Err(invalid("retry.sweep_interval_secs cannot be 0"));
    }

    if config.subscription.enabled && config.subscription.check_interval_secs == 0 {
        return Err(invalid("subscription.check_interval_secs cannot be 0"));
    }

    if config.audit.buffer_size == 0 {
        return Err(invalid("audit.buffer_size cannot be 0"));
    }

    if let Some(upstream) = &config.upstream {
        if upstream.url.trim().is_empty() {
            return Err(invalid("upstream.url cannot be empty"));
        }
        if upstream.api_key.trim().is_empty() {
            return Err(invalid("upstream.api_key cannot be empty"));
        }
    }

    if let Some(metadata) = &config.metadata {
        if metadata.client_id.trim().is_empty() {
            return Err(invalid("metadata.client_id cannot be empty"));
        }
    }

    if let Some(backend) = &config.backend {
        if backend.url.trim().is_empty() {
            return Err(invalid("backend.url cannot be empty"));
        }
        if backend.dispatch_buffer == 0 {
            return Err(invalid("backend.dispatch_buffer cannot be 0"));
        }
    }

    Ok(())
}
