//! Measurements which are not tied to the session state.

use crate::protocol::scpi::{period_command, INVALID_MEASUREMENT};
use crate::protocol::{parse_numeric, Channel, Edge, ProtocolError};
use crate::session::Infiniium;
use crate::transport::Transport;

/// Period of the signal on `channel`, as returned by the scope.
pub async fn period_raw<T: Transport>(
    scope: &mut Infiniium<T>,
    channel: Channel,
    edge: Edge,
) -> crate::Result<String> {
    scope.query(&period_command(channel, edge)).await
}

/// Period of the signal on `channel` in seconds.
///
/// Fails with [`ProtocolError::InvalidMeasurement`] if the scope could not
/// make the measurement, e.g. because there is no signal.
pub async fn period<T: Transport>(scope: &mut Infiniium<T>, channel: Channel, edge: Edge) -> crate::Result<f64> {
    let raw = period_raw(scope, channel, edge).await?;
    let value = parse_numeric(&raw)?;
    if !value.is_finite() || value >= INVALID_MEASUREMENT {
        return Err(ProtocolError::InvalidMeasurement(raw).into());
    }
    Ok(value)
}
