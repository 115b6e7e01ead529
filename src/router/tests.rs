//! Tests for Router module

use super::*;
use proptest::prelude::*;

fn ch(number: u8) -> Channel {
    Channel::from_one_based(number).unwrap()
}

fn note_on(channel: u8, note: u8, velocity: u8) -> RawMessage {
    RawMessage::new(0x90 | channel, note, velocity)
}

fn note_off(channel: u8, note: u8, velocity: u8) -> RawMessage {
    RawMessage::new(0x80 | channel, note, velocity)
}

fn cc(channel: u8, controller: u8, value: u8) -> RawMessage {
    RawMessage::new(0xB0 | channel, controller, value)
}

fn pedal(value: u8) -> RawMessage {
    cc(0, SUSTAIN_PEDAL, value)
}

/// Router holding notes 60, 64, 67 under a pressed pedal
fn router_with_held_chord() -> Router {
    let mut router = Router::new();
    assert!(router.handle_inbound(pedal(127)).is_empty());
    for note in [60, 64, 67] {
        router.handle_inbound(note_on(0, note, 100));
        assert!(router.handle_inbound(note_off(0, note, 0)).is_empty());
    }
    router
}

#[test]
fn test_defaults() {
    let router = Router::new();

    assert_eq!(router.input_filter(), ChannelFilter::Any);
    assert_eq!(router.output_channel().index(), 0);
    assert_eq!(router.sustain_mode(), SustainMode::Momentary);
    assert!(!router.is_sustain_active());
    assert!(router.held_notes().is_empty());
}

#[test]
fn test_channel_filter_drops_other_channels() {
    let mut router = router_with_held_chord();
    router.set_input_filter(ChannelFilter::Only(Channel::new(5).unwrap()));

    // Note On for a held pitch on a filtered channel must not touch held notes
    assert!(router.handle_inbound(note_on(3, 60, 100)).is_empty());
    assert_eq!(router.held_notes(), &[60, 64, 67]);

    // Nor does a filtered pedal release flush them
    assert!(router.handle_inbound(pedal(0)).is_empty());
    assert!(router.is_sustain_active());
}

#[test]
fn test_channel_filter_passes_selected_channel() {
    let mut router = Router::new();
    router.set_input_filter(ChannelFilter::Only(Channel::new(5).unwrap()));

    let out = router.handle_inbound(note_on(5, 60, 100));
    assert_eq!(out, vec![note_on(0, 60, 100)]);
}

#[test]
fn test_note_off_without_sustain_uses_release_velocity() {
    let mut router = Router::new();

    let out = router.handle_inbound(note_off(0, 60, 12));
    assert_eq!(out, vec![note_off(0, 60, RELEASE_VELOCITY)]);
}

#[test]
fn test_sustain_defers_note_off() {
    let mut router = Router::new();
    router.handle_inbound(pedal(127));

    assert!(router.handle_inbound(note_off(0, 60, 0)).is_empty());
    assert_eq!(router.held_notes(), &[60]);

    // Repeated note-off for the same pitch is idempotent
    assert!(router.handle_inbound(note_off(0, 60, 0)).is_empty());
    assert_eq!(router.held_notes(), &[60]);

    // Re-striking cancels the pending release
    let out = router.handle_inbound(note_on(0, 60, 90));
    assert_eq!(out, vec![note_on(0, 60, 90)]);
    assert!(router.held_notes().is_empty());
    assert!(router.is_sustain_active());
}

#[test]
fn test_pedal_release_flushes_held_notes() {
    let mut router = router_with_held_chord();
    router.set_output_channel(ch(10));

    let out = router.handle_inbound(pedal(0));

    assert_eq!(
        out,
        vec![note_off(9, 60, 64), note_off(9, 64, 64), note_off(9, 67, 64)]
    );
    assert!(router.held_notes().is_empty());
    assert!(!router.is_sustain_active());
}

#[test]
fn test_partial_pedal_counts_as_released() {
    let mut router = router_with_held_chord();

    let out = router.handle_inbound(pedal(100));
    assert_eq!(out.len(), 3);
    assert!(!router.is_sustain_active());
}

#[test]
fn test_pedal_is_never_forwarded() {
    let mut router = Router::new();

    assert!(router.handle_inbound(pedal(127)).is_empty());
    assert!(router.handle_inbound(pedal(0)).is_empty());
}

#[test]
fn test_latched_sustain_ignores_pedal_release() {
    let mut router = Router::new();
    assert!(router.set_sustain_mode(SustainMode::Latched).is_empty());
    assert!(router.is_sustain_active());

    router.handle_inbound(note_off(0, 60, 0));
    assert!(router.handle_inbound(pedal(0)).is_empty());

    assert!(router.is_sustain_active());
    assert_eq!(router.held_notes(), &[60]);
}

#[test]
fn test_leaving_latch_releases_held_notes() {
    let mut router = Router::new();
    router.set_sustain_mode(SustainMode::Latched);
    router.handle_inbound(note_off(0, 48, 0));
    router.handle_inbound(note_off(0, 52, 0));

    let out = router.set_sustain_mode(SustainMode::Momentary);

    assert_eq!(out, vec![note_off(0, 48, 64), note_off(0, 52, 64)]);
    assert!(!router.is_sustain_active());
    assert_eq!(router.sustain_mode(), SustainMode::Momentary);
}

#[test]
fn test_latching_keeps_pedal_held_notes() {
    let mut router = router_with_held_chord();

    assert!(router.set_sustain_mode(SustainMode::Latched).is_empty());
    assert!(router.handle_inbound(pedal(0)).is_empty());
    assert_eq!(router.held_notes().len(), 3);
}

#[test]
fn test_reselecting_momentary_keeps_pedal_sustain() {
    let mut router = router_with_held_chord();

    assert!(router.set_sustain_mode(SustainMode::Momentary).is_empty());
    assert!(router.is_sustain_active());
    assert_eq!(router.held_notes().len(), 3);
}

#[test]
fn test_release_all_keeps_sustain_state() {
    let mut router = router_with_held_chord();

    let out = router.release_all();
    assert_eq!(out.len(), 3);
    assert!(router.held_notes().is_empty());
    assert!(router.is_sustain_active());

    assert!(router.release_all().is_empty());
}

#[test]
fn test_passthrough_is_remapped() {
    let mut router = Router::new();
    router.set_output_channel(ch(10));

    // Modulation wheel
    assert_eq!(router.handle_inbound(cc(2, 1, 33)), vec![cc(9, 1, 33)]);
    // Pitch bend
    assert_eq!(
        router.handle_inbound(RawMessage::new(0xE4, 0x00, 0x40)),
        vec![RawMessage::new(0xE9, 0x00, 0x40)]
    );
    // Program change
    assert_eq!(
        router.handle_inbound(RawMessage::new(0xC0, 7, 0)),
        vec![RawMessage::new(0xC9, 7, 0)]
    );
}

#[test]
fn test_route_into_sink() {
    let mut router = router_with_held_chord();
    let mut sink: Vec<RawMessage> = Vec::new();

    assert_eq!(router.route(note_on(0, 72, 80), &mut sink), 1);
    assert_eq!(router.route(pedal(0), &mut sink), 3);
    assert_eq!(sink.len(), 4);
}

struct FailingSink;

impl MessageSink for FailingSink {
    fn send(&mut self, _msg: &RawMessage) -> anyhow::Result<()> {
        anyhow::bail!("port closed")
    }
}

#[test]
fn test_failed_sends_do_not_disturb_state() {
    let mut router = router_with_held_chord();

    assert_eq!(router.route(pedal(0), &mut FailingSink), 0);
    assert!(router.held_notes().is_empty());
    assert!(!router.is_sustain_active());
}

#[test]
fn test_status_display() {
    let mut router = router_with_held_chord();
    router.set_input_filter(ChannelFilter::Only(ch(3)));

    let status = router.status();
    assert_eq!(status.held_notes, vec![60, 64, 67]);
    assert_eq!(
        status.to_string(),
        "in: 3 | out: 1 | sustain: momentary (on) | held: [60, 64, 67]"
    );
}

fn inbound_message() -> impl Strategy<Value = RawMessage> {
    prop_oneof![
        (0u8..16, 0u8..128, 0u8..128).prop_map(|(c, n, v)| note_on(c, n, v)),
        (0u8..16, 0u8..128, 0u8..128).prop_map(|(c, n, v)| note_off(c, n, v)),
        (0u8..16, prop_oneof![Just(0u8), Just(64u8), Just(127u8)]).prop_map(|(c, v)| cc(c, SUSTAIN_PEDAL, v)),
        (0x80u8..0xF0, 0u8..128, 0u8..128).prop_map(|(s, a, b)| RawMessage::new(s, a, b)),
    ]
}

proptest! {
    #[test]
    fn prop_held_notes_empty_when_sustain_inactive(
        messages in prop::collection::vec(inbound_message(), 0..64),
        latch_at in prop::option::of(0usize..64),
    ) {
        let mut router = Router::new();
        for (i, msg) in messages.into_iter().enumerate() {
            if latch_at == Some(i) {
                router.set_sustain_mode(SustainMode::Latched);
            }
            router.handle_inbound(msg);

            if !router.is_sustain_active() {
                prop_assert!(router.held_notes().is_empty());
            }
            let mut seen = router.held_notes().to_vec();
            seen.sort_unstable();
            seen.dedup();
            prop_assert_eq!(seen.len(), router.held_notes().len());
        }
    }

    #[test]
    fn prop_every_output_uses_output_channel(
        messages in prop::collection::vec(inbound_message(), 0..64),
        out in 0u8..16,
        filter in prop::option::of(0u8..16),
    ) {
        let mut router = Router::new();
        router.set_output_channel(Channel::new(out).unwrap());
        if let Some(c) = filter {
            router.set_input_filter(ChannelFilter::Only(Channel::new(c).unwrap()));
        }

        for msg in messages {
            for emitted in router.handle_inbound(msg) {
                prop_assert_eq!(emitted.status() & 0x0F, out);
            }
        }
        for emitted in router.set_sustain_mode(SustainMode::Momentary) {
            prop_assert_eq!(emitted.status() & 0x0F, out);
        }
    }
}
