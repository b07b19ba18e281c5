use super::*;

/// Validate the complete configuration
pub fn validate_config(config: &BenchConfig) -> Result<()> {
    validate_server_config(&config.server)?;
    validate_load_config(&config.load)?;
    validate_readiness_config(&config.readiness)?;

    if config.auth.request_timeout.is_zero() {
        return Err(BenchError::configuration(
            "Auth request timeout must be greater than 0",
        ));
    }

    let matrix = config.matrix();
    matrix.validate()?;

    if matrix.uses_tls() && (config.server.ssl_cert.is_none() || config.server.ssl_key.is_none()) {
        return Err(BenchError::configuration(
            "The matrix contains TLS suites but server.ssl_cert and server.ssl_key are not both set",
        ));
    }

    Ok(())
}

fn validate_server_config(server: &ServerConfig) -> Result<()> {
    if server.port == 0 {
        return Err(BenchError::configuration(
            "Port must be between 1 and 65535, got: 0",
        ));
    }

    if server.address.trim().is_empty() {
        return Err(BenchError::configuration("Server address cannot be empty"));
    }

    if server.binary.as_os_str().is_empty() {
        return Err(BenchError::configuration("Server binary path cannot be empty"));
    }

    if server.graceful_timeout.is_zero() {
        return Err(BenchError::configuration(
            "Graceful timeout must be greater than 0",
        ));
    }

    if server.ssl_cert.is_some() != server.ssl_key.is_some() {
        return Err(BenchError::configuration(
            "server.ssl_cert and server.ssl_key must be given together",
        ));
    }

    Ok(())
}

fn validate_load_config(load: &LoadConfig) -> Result<()> {
    if load.repetitions == 0 {
        return Err(BenchError::configuration("Repetitions must be at least 1"));
    }

    if load.duration.is_zero() {
        return Err(BenchError::configuration(
            "Load test duration must be greater than 0",
        ));
    }

    load.retry.validate()
}

fn validate_readiness_config(readiness: &ReadinessConfig) -> Result<()> {
    if readiness.timeout.is_zero() {
        return Err(BenchError::configuration(
            "Readiness timeout must be greater than 0",
        ));
    }

    if readiness.interval.is_zero() {
        return Err(BenchError::configuration(
            "Readiness poll interval must be greater than 0",
        ));
    }

    if readiness.connect_timeout.is_zero() {
        return Err(BenchError::configuration(
            "Readiness connect timeout must be greater than 0",
        ));
    }

    Ok(())
}
