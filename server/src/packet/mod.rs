mod player_packet_queue;
mod queued_packet;

pub use player_packet_queue::{EnqueueResult, HeadAction, PlayerPacketQueue, Polled};
pub use queued_packet::{PacketHeader, QueuedPacket};
