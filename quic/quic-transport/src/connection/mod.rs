// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The connection state machine (spec section 4.2) and the [`Connection`]
//! context that assembles packet-number spaces, crypto contexts, and the
//! path manager around it.

pub mod crypto;
pub mod space;

use crate::path_manager::PathManager;
use core::time::Duration;
use quic_core::{
    connection::Limits,
    crypto::CryptoSuite,
    inet::ExplicitCongestionNotification,
    packet::number::PacketNumberSpace,
    recovery::CongestionController,
    stateless_reset,
    time::Timestamp,
};
use space::SpaceState;

/// All states the connection state machine can occupy (spec section 4.2).
/// Built with [`quic_core::state`]'s declarative macros so every transition
/// is an exhaustively-checked method rather than an ad hoc comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    ClientInit,
    ClientInitSent,
    ClientInitResent,
    ClientHandshakeStart,
    ClientHandshakeProgress,
    ClientAlmostReady,
    ClientReady,
    ServerListening,
    ServerInit,
    ServerAlmostReady,
    ServerFalseStart,
    Ready,
    HandshakeFailure,
    ClosingReceived,
    Draining,
    Closing,
    Disconnected,
}

impl State {
    quic_core::state::event!(
        /// The client transmits its first Initial packet.
        client_send_initial(ClientInit => ClientInitSent);
        /// The client's PTO for the Initial space fired with no response yet.
        client_retransmit_initial(ClientInitSent | ClientInitResent => ClientInitResent);
        /// A valid Retry arrived; restart the Initial exchange with the
        /// server-chosen connection ID (spec section 4.2, Retry handling).
        client_accept_retry(ClientInitSent | ClientInitResent => ClientInitSent);
        /// Handshake keys installed by the TLS collaborator.
        client_install_handshake_keys(ClientInitSent | ClientInitResent => ClientHandshakeStart);
        /// The TLS collaborator made forward progress on the handshake.
        client_advance_handshake(ClientHandshakeStart => ClientHandshakeProgress);
        /// The handshake crypto flow completed; 1-RTT keys can be derived.
        client_complete_crypto(ClientHandshakeProgress => ClientAlmostReady);
        /// 1-RTT keys installed; the client may now send application data.
        client_install_one_rtt_keys(ClientAlmostReady => ClientReady);
        /// The TLS collaborator confirmed the handshake (received a HANDSHAKE_DONE
        /// or, server-side, the first 1-RTT packet from the client).
        client_confirm_handshake(ClientReady => Ready);

        /// A server-side Initial packet created this connection context.
        server_receive_initial(ServerListening => ServerInit);
        /// Handshake keys installed; the server may start sending Handshake
        /// packets.
        server_install_handshake_keys(ServerInit => ServerAlmostReady);
        /// The server sends application data before the handshake is
        /// confirmed by the client (RFC 9001 section 4.1.2 "0.5-RTT data").
        server_false_start(ServerAlmostReady => ServerFalseStart);
        /// The server received the client's Handshake-space ack, confirming
        /// the handshake.
        server_confirm_handshake(ServerAlmostReady | ServerFalseStart => Ready);

        /// The TLS collaborator reported a fatal handshake error.
        fail_handshake(
            ClientInit
            | ClientInitSent
            | ClientInitResent
            | ClientHandshakeStart
            | ClientHandshakeProgress
            | ClientAlmostReady
            | ClientReady
            | ServerListening
            | ServerInit
            | ServerAlmostReady
            | ServerFalseStart
            => HandshakeFailure
        );
        /// A CONNECTION_CLOSE frame was received from the peer.
        receive_close(
            ClientInit
            | ClientInitSent
            | ClientInitResent
            | ClientHandshakeStart
            | ClientHandshakeProgress
            | ClientAlmostReady
            | ClientReady
            | ServerListening
            | ServerInit
            | ServerAlmostReady
            | ServerFalseStart
            | Ready
            => ClosingReceived
        );
        /// A local error or application request closes the connection.
        close(
            ClientInit
            | ClientInitSent
            | ClientInitResent
            | ClientHandshakeStart
            | ClientHandshakeProgress
            | ClientAlmostReady
            | ClientReady
            | ServerListening
            | ServerInit
            | ServerAlmostReady
            | ServerFalseStart
            | Ready
            => Closing
        );
        /// The close's ack (or its own PTO) fired; enter the drain timer.
        enter_draining(ClosingReceived => Draining);
        /// The drain timer, or the handshake-failure/close teardown, fired.
        finish_draining(Draining | HandshakeFailure | Closing => Disconnected);
    );

    quic_core::state::is!(is_ready, Ready);
    quic_core::state::is!(is_closing, ClosingReceived | Draining | Closing);
    quic_core::state::is!(is_disconnected, Disconnected);
    quic_core::state::is!(
        accepts_one_rtt,
        ClientAlmostReady | ClientReady | Ready | ServerAlmostReady | ServerFalseStart
    );
    quic_core::state::is!(accepts_zero_rtt, ServerAlmostReady);
}

/// Per-PN-space ECN counters (spec section 3, "ECN counters per category").
#[derive(Clone, Copy, Debug, Default)]
pub struct EcnCounters {
    pub ect0: u64,
    pub ect1: u64,
    pub ce: u64,
    /// Set once an ECN-marked packet has been counted since the last ACK
    /// was sent, gating whether the next outgoing ACK frame carries ECN
    /// counts (spec section 4.3, "ECN": "set sending_ecn_ack = 1").
    pub sending_ecn_ack: bool,
}

impl EcnCounters {
    /// Applied only for packets received on the default path (spec section
    /// 4.3, "ECN").
    pub fn on_packet_received(&mut self, ecn: ExplicitCongestionNotification) {
        match ecn {
            ExplicitCongestionNotification::ECT0 => self.ect0 += 1,
            ExplicitCongestionNotification::ECT1 => self.ect1 += 1,
            ExplicitCongestionNotification::CE => self.ce += 1,
            ExplicitCongestionNotification::NotECT => return,
        }
        self.sending_ecn_ack = true;
    }

    /// Clears `sending_ecn_ack` once the pending ECN counts have gone out on
    /// an ACK frame.
    pub fn clear_ack_pending(&mut self) {
        self.sending_ecn_ack = false;
    }
}

/// The three packet-number spaces a connection tracks independently.
pub struct Spaces {
    pub initial: SpaceState,
    pub handshake: SpaceState,
    pub application: SpaceState,
}

impl Default for Spaces {
    fn default() -> Self {
        Self {
            initial: SpaceState::new(PacketNumberSpace::Initial),
            handshake: SpaceState::new(PacketNumberSpace::Handshake),
            application: SpaceState::new(PacketNumberSpace::ApplicationData),
        }
    }
}

impl Spaces {
    pub fn get(&mut self, space: PacketNumberSpace) -> &mut SpaceState {
        match space {
            PacketNumberSpace::Initial => &mut self.initial,
            PacketNumberSpace::Handshake => &mut self.handshake,
            PacketNumberSpace::ApplicationData => &mut self.application,
        }
    }
}

/// The central per-connection entity (spec section 3, "Connection context").
pub struct Connection<C: CryptoSuite, CC: CongestionController> {
    pub state: State,
    pub spaces: Spaces,
    pub crypto: crypto::Contexts<C>,
    pub paths: PathManager<CC>,
    pub ecn: EcnCounters,
    pub ack_pending: bool,
    pub limits: Limits,
    /// Set once a valid Retry has been processed; a second Retry for the
    /// same handshake is rejected (spec section 4.2, "Retry").
    pub retry_accepted: bool,
    /// The client-side pending retry-token bytes to attach to the next
    /// Initial packet, if a Retry was received.
    #[cfg(feature = "alloc")]
    pub retry_token: Option<alloc::vec::Vec<u8>>,
    /// The time the handshake was confirmed, once it has been. Drives the
    /// drain window in [`Connection::accepts_handshake_epoch`].
    pub ready_at: Option<Timestamp>,
}

impl<C: CryptoSuite, CC: CongestionController> Connection<C, CC> {
    pub fn new(state: State, paths: PathManager<CC>, limits: Limits) -> Self {
        Self {
            state,
            spaces: Spaces::default(),
            crypto: crypto::Contexts::default(),
            paths,
            ecn: EcnCounters::default(),
            ack_pending: false,
            limits,
            retry_accepted: false,
            #[cfg(feature = "alloc")]
            retry_token: None,
            ready_at: None,
        }
    }

    /// Records that the handshake was confirmed at `now`, opening the
    /// bounded drain window [`Connection::accepts_handshake_epoch`] checks
    /// against.
    pub fn mark_ready(&mut self, now: Timestamp) {
        self.ready_at = Some(now);
    }

    /// Whether handshake-epoch packets are still meaningfully processed.
    /// Resolves the design notes' bound for handshake-space drain: acks
    /// continue for 3 PTOs' worth of retransmission after `ready` rather
    /// than indefinitely, rather than being cut off the instant the state
    /// machine reaches `Ready`.
    pub fn accepts_handshake_epoch(&self, now: Timestamp, pto: Duration) -> bool {
        if matches!(
            self.state,
            State::HandshakeFailure | State::ClosingReceived | State::Draining | State::Closing | State::Disconnected
        ) {
            return false;
        }

        match self.ready_at {
            None => true,
            Some(ready_at) => now <= ready_at + pto * 3,
        }
    }

    pub fn on_stateless_reset(&mut self) {
        self.state = State::Disconnected;
    }

    pub fn is_reset_token_match(&self, token: &stateless_reset::Token) -> bool {
        self.paths
            .path(self.paths.active_path_id())
            .stateless_reset_token
            .as_ref()
            .map_or(false, |expected| expected == token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecn_counters_increment_the_matching_category_and_arm_the_ack_flag() {
        let mut ecn = EcnCounters::default();
        ecn.on_packet_received(ExplicitCongestionNotification::ECT0);
        ecn.on_packet_received(ExplicitCongestionNotification::ECT0);
        ecn.on_packet_received(ExplicitCongestionNotification::CE);
        ecn.on_packet_received(ExplicitCongestionNotification::ECT1);

        assert_eq!(ecn.ect0, 2);
        assert_eq!(ecn.ect1, 1);
        assert_eq!(ecn.ce, 1);
        assert!(ecn.sending_ecn_ack);

        ecn.clear_ack_pending();
        assert!(!ecn.sending_ecn_ack);
    }

    #[test]
    fn not_ect_does_not_arm_the_ack_flag() {
        let mut ecn = EcnCounters::default();
        ecn.on_packet_received(ExplicitCongestionNotification::NotECT);
        assert!(!ecn.sending_ecn_ack);
    }

    #[test]
    fn client_happy_path_reaches_ready() {
        let mut state = State::ClientInit;
        state.client_send_initial().unwrap();
        state.client_install_handshake_keys().unwrap();
        state.client_advance_handshake().unwrap();
        state.client_complete_crypto().unwrap();
        state.client_install_one_rtt_keys().unwrap();
        state.client_confirm_handshake().unwrap();
        assert_eq!(state, State::Ready);
        assert!(state.is_ready());
    }

    #[test]
    fn server_false_start_then_confirm() {
        let mut state = State::ServerListening;
        state.server_receive_initial().unwrap();
        state.server_install_handshake_keys().unwrap();
        state.server_false_start().unwrap();
        assert!(state.accepts_one_rtt());
        state.server_confirm_handshake().unwrap();
        assert_eq!(state, State::Ready);
    }

    #[test]
    fn retry_resets_a_resent_client_to_init_sent() {
        let mut state = State::ClientInitResent;
        state.client_accept_retry().unwrap();
        assert_eq!(state, State::ClientInitSent);
        // the bare state machine allows `client_accept_retry` to be called
        // again from `ClientInitSent`; single-acceptance of a Retry is
        // enforced by `Connection::retry_accepted`, not by this enum.
        assert!(state.client_accept_retry().is_ok());
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let mut state = State::ClientInit;
        assert!(state.client_install_one_rtt_keys().is_err());
        assert_eq!(state, State::ClientInit);
    }

    #[test]
    fn close_from_any_active_state_reaches_disconnected() {
        let mut state = State::ServerFalseStart;
        state.close().unwrap();
        assert_eq!(state, State::Closing);
        state.finish_draining().unwrap();
        assert_eq!(state, State::Disconnected);
        assert!(state.is_disconnected());
    }

    #[test]
    fn receive_close_drains_before_disconnecting() {
        let mut state = State::Ready;
        state.receive_close().unwrap();
        assert_eq!(state, State::ClosingReceived);
        state.enter_draining().unwrap();
        assert_eq!(state, State::Draining);
        state.finish_draining().unwrap();
        assert_eq!(state, State::Disconnected);
    }
}
