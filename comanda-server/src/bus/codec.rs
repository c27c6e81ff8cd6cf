//! Wire framing for the message bus
//!
//! Frame layout: 1 byte event type tag + 4-byte little-endian payload
//! length + JSON-serialized [`BusMessage`]. The tag always mirrors the
//! envelope's `event_type`; a mismatch means a corrupt or hostile peer.

use shared::message::{BusMessage, EventType, MAX_FRAME_BYTES};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::utils::{AppError, AppResult};

/// Read one frame from the stream
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> AppResult<BusMessage> {
    let mut type_buf = [0u8; 1];
    reader
        .read_exact(&mut type_buf)
        .await
        .map_err(|e| AppError::internal(format!("Read type failed: {e}")))?;
    let event_type = EventType::try_from(type_buf[0])
        .map_err(|v| AppError::invalid(format!("Invalid event type {v}")))?;

    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| AppError::internal(format!("Read len failed: {e}")))?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(AppError::invalid(format!(
            "Frame of {len} bytes exceeds the {MAX_FRAME_BYTES} byte limit"
        )));
    }

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| AppError::internal(format!("Read payload failed: {e}")))?;

    let msg: BusMessage = serde_json::from_slice(&payload)
        .map_err(|e| AppError::invalid(format!("Malformed frame payload: {e}")))?;
    if msg.event_type != event_type {
        return Err(AppError::invalid(format!(
            "Frame tag {:?} does not match envelope type {:?}",
            event_type, msg.event_type
        )));
    }
    Ok(msg)
}

/// Write one frame to the stream
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    msg: &BusMessage,
) -> AppResult<()> {
    let payload =
        serde_json::to_vec(msg).map_err(|e| AppError::internal(format!("Encode failed: {e}")))?;
    if payload.len() > MAX_FRAME_BYTES {
        return Err(AppError::invalid(format!(
            "Frame of {} bytes exceeds the {MAX_FRAME_BYTES} byte limit",
            payload.len()
        )));
    }

    let mut data = Vec::with_capacity(1 + 4 + payload.len());
    data.push(msg.event_type.as_u8());
    data.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    data.extend_from_slice(&payload);

    writer
        .write_all(&data)
        .await
        .map_err(|e| AppError::internal(format!("Write failed: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::session::TableAccessPayload;

    #[tokio::test]
    async fn frames_round_trip_over_a_duplex_pipe() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let msg = BusMessage::try_access_table("5", "client-a");
        write_frame(&mut client, &msg).await.unwrap();

        let decoded = read_frame(&mut server).await.unwrap();
        assert_eq!(decoded.event_type, EventType::TryAccessTable);
        assert_eq!(decoded.request_id, msg.request_id);
        let payload: TableAccessPayload = decoded.decode_payload().unwrap();
        assert_eq!(payload.table_id, "5");
    }

    #[tokio::test]
    async fn unknown_event_tag_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        client.write_all(&[99u8, 0, 0, 0, 0]).await.unwrap();

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, AppError::Invalid(_)));
    }

    #[tokio::test]
    async fn oversized_length_header_is_rejected_before_allocation() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let mut bytes = vec![EventType::Heartbeat.as_u8()];
        bytes.extend_from_slice(&(MAX_FRAME_BYTES as u32 + 1).to_le_bytes());
        client.write_all(&bytes).await.unwrap();

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, AppError::Invalid(_)));
    }

    #[tokio::test]
    async fn tag_and_envelope_must_agree() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let msg = BusMessage::heartbeat("5", "client-a");
        let payload = serde_json::to_vec(&msg).unwrap();
        let mut bytes = vec![EventType::JoinTable.as_u8()];
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&payload);
        client.write_all(&bytes).await.unwrap();

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, AppError::Invalid(_)));
    }

    #[tokio::test]
    async fn truncated_stream_is_an_io_error() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        client
            .write_all(&[EventType::Heartbeat.as_u8(), 50, 0, 0, 0])
            .await
            .unwrap();
        drop(client);

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
