//! The built-in descriptor table, in `Param` ordinal order.

use super::{Cardinality::*, Descriptor, Param, Source};
use crate::model::ValueType::*;

pub static DESCRIPTORS: [Descriptor; Param::COUNT] = [
    // ========================================================================
    // Network
    // ========================================================================
    Descriptor::new(Param::NcNode, "nc_node", Network, UInt32, Source::NetworkInfo),
    Descriptor::new(Param::BackupNcNode, "backup_nc_node", Network, UInt32, Source::NetworkInfo),
    Descriptor::new(Param::NetworkState, "network_state", Network, UInt32, Source::NetworkInfo),
    Descriptor::new(Param::BeaconChannel, "beacon_channel", Network, UInt32, Source::NetworkInfo),
    Descriptor::new(Param::NetworkMocaVersion, "network_moca_version", Network, UInt32, Source::NetworkInfo),
    Descriptor::new(Param::SelfNode, "self_node", Network, UInt32, Source::NetworkInfo).admission_constant(),
    Descriptor::new(Param::LinkUpEvents, "link_up_events", Network, UInt32, Source::EventCounters).link_up_timing(),
    Descriptor::new(Param::LinkDownEvents, "link_down_events", Network, UInt32, Source::EventCounters).link_up_timing(),
    Descriptor::new(Param::AdmissionFailures, "admission_failures", Network, UInt32, Source::EventCounters),
    Descriptor::new(Param::LinkUpSeconds, "link_up_seconds", Network, UInt32, Source::EventCounters).link_up_timing(),
    Descriptor::new(Param::Password, "password", Network, Password, Source::Password),
    Descriptor::new(Param::TabooStartChannel, "taboo_start_channel", Network, UInt32, Source::Misc),
    Descriptor::new(Param::TabooChannelMask, "taboo_channel_mask", Network, UInt32, Source::Misc),
    Descriptor::new(Param::LineOfSight, "line_of_sight", Network, CentiDecibel, Source::Misc),
    Descriptor::new(Param::AdvancedLinkCounter, "advanced_link_counter", Network, UInt32, Source::Misc),
    Descriptor::new(Param::LinkStatus, "link_status", Network, UInt32, Source::Misc),
    // ========================================================================
    // Node
    // ========================================================================
    Descriptor::new(Param::NodeMacAddr, "node_mac", Node, MacAddr, Source::NodeInfo).admission_constant(),
    Descriptor::new(Param::NodeMocaVersion, "node_moca_version", Node, UInt32, Source::NodeInfo).admission_constant(),
    Descriptor::new(Param::NodePreferredNc, "node_preferred_nc", Node, UInt32, Source::NodeInfo).admission_constant(),
    Descriptor::new(Param::NodeProtocolCaps, "node_protocol_caps", Node, UInt32, Source::NodeInfo).admission_constant(),
    Descriptor::new(Param::NodeAdmittedSeconds, "node_admitted_seconds", Node, UInt32, Source::NodeInfo).link_up_timing(),
    Descriptor::new(Param::NodeFirmwareVersion, "node_firmware_version", Node, UInt32, Source::L2me).admission_constant(),
    Descriptor::new(Param::NodeTxPower, "node_tx_power", Node, CentiDecibel, Source::L2me),
    Descriptor::new(Param::NodeUptime, "node_uptime", Node, UInt32, Source::L2me).link_up_timing(),
    Descriptor::new(Param::NodeRxPackets, "node_rx_packets", Node, UInt32, Source::L2me),
    Descriptor::new(Param::NodeTemperature, "node_temperature", Node, Int32, Source::L2me),
    Descriptor::new(Param::NodeRxErrors, "node_rx_errors", Node, UInt32, Source::L2me),
    Descriptor::new(Param::NodeBroadcastProfile, "node_broadcast_profile", Node, Profile, Source::L2me),
    Descriptor::new(Param::NodeMapProfile, "node_map_profile", Node, Profile, Source::L2me),
    // ========================================================================
    // Link
    // ========================================================================
    Descriptor::new(Param::LinkTxPhyRate, "link_tx_phy_rate", Link, UInt32, Source::FullMeshRate),
    Descriptor::new(Param::LinkTxNbas, "link_tx_nbas", Link, UInt32, Source::FullMeshRate),
    Descriptor::new(Param::LinkRxPower, "link_rx_power", Link, CentiDecibel, Source::L2me),
    Descriptor::new(Param::LinkSnr, "link_snr", Link, CentiDecibel, Source::L2me),
    Descriptor::new(Param::LinkTxPackets, "link_tx_packets", Link, UInt32, Source::L2me),
    Descriptor::new(Param::LinkRxPackets, "link_rx_packets", Link, UInt32, Source::L2me),
    Descriptor::new(Param::LinkRxErrors, "link_rx_errors", Link, UInt32, Source::L2me),
    Descriptor::new(Param::LinkTxBackoff, "link_tx_backoff", Link, CentiDecibel, Source::L2me),
    Descriptor::new(Param::LinkRxUnicastProfile, "link_rx_unicast_profile", Link, Profile, Source::L2me),
    Descriptor::new(Param::LinkTxUnicastProfile, "link_tx_unicast_profile", Link, Profile, Source::L2me),
];
