//! Wire-level behavior of the slave phase machine: packet reception,
//! response turnaround, the receive-byte heuristic, and fault reporting.

mod common;

use common::{HwCall, MockXcvr};
use smbus_engine::{
    Pec, Phase, ProtocolState, SlaveEngine, SlaveFault, SmbusSlave, NOTHING_TO_REPORT,
};

// Slave answers at 0x2A: 0x54 is write-to-us, 0x55 is read-from-us.
const ADDR_W: u8 = 0x54;
const ADDR_R: u8 = 0x55;

fn pec_over(bytes: &[u8]) -> u8 {
    let mut pec = Pec::new();
    for &b in bytes {
        pec.fold(b);
    }
    pec.value()
}

#[test]
fn block_write_packet_received() {
    let engine = SlaveEngine::<40, 40>::new(false);
    let slave = SmbusSlave::new(&engine);

    assert_eq!(engine.process_start(ADDR_W), ProtocolState::Ok);
    assert_eq!(engine.phase(), Phase::Receiving);

    assert_eq!(engine.process_received_byte(0x10), ProtocolState::FirstByte);
    assert_eq!(slave.command(), 0x10);
    for byte in [0x03, 0x01, 0x02, 0x03] {
        assert_eq!(engine.process_received_byte(byte), ProtocolState::ByteReceived);
    }

    assert_eq!(engine.process_stop_completed(), ProtocolState::CommandComplete);
    assert_eq!(engine.phase(), Phase::Idle);

    let mut buf = [0u8; 8];
    assert_eq!(slave.read_received(&mut buf), Ok(5));
    assert_eq!(&buf[..5], &[0x10, 0x03, 0x01, 0x02, 0x03]);
}

#[test]
fn quick_command_detected() {
    let engine = SlaveEngine::<40, 40>::new(false);

    assert_eq!(engine.process_start(ADDR_W), ProtocolState::Ok);
    assert_eq!(engine.process_stop_completed(), ProtocolState::QuickCommand);
    assert_eq!(engine.phase(), Phase::Idle);
}

#[test]
fn read_after_write_turnaround_with_pec() {
    let engine = SlaveEngine::<40, 40>::new(true);
    let slave = SmbusSlave::new(&engine);

    engine.process_start(ADDR_W);
    assert_eq!(engine.process_received_byte(0x05), ProtocolState::FirstByte);
    engine.process_received_byte(0x77);
    let trailer = pec_over(&[ADDR_W, 0x05, 0x77]);
    engine.process_received_byte(trailer);

    // Application validated the command and queued its answer.
    slave.write_response(&[0x12, 0x34]).unwrap();

    assert_eq!(engine.process_start(ADDR_R), ProtocolState::CommandComplete);
    assert_eq!(engine.phase(), Phase::TransmittingResponse);

    // Trailing PEC byte is discounted from the reported payload.
    let mut buf = [0u8; 8];
    assert_eq!(slave.read_received(&mut buf), Ok(2));
    assert_eq!(&buf[..2], &[0x05, 0x77]);

    assert_eq!(engine.process_byte_requested(), 0x12);
    assert_eq!(engine.process_byte_requested(), 0x34);
    assert_eq!(
        engine.process_byte_requested(),
        pec_over(&[ADDR_R, 0x12, 0x34])
    );
    assert_eq!(engine.process_byte_requested(), NOTHING_TO_REPORT);

    assert_eq!(engine.process_stop_completed(), ProtocolState::Ok);
    assert_eq!(engine.phase(), Phase::Idle);
}

#[test]
fn repeated_start_with_bad_pec() {
    let engine = SlaveEngine::<40, 40>::new(true);

    engine.process_start(ADDR_W);
    engine.process_received_byte(0x05);
    engine.process_received_byte(0xDE); // wrong trailer

    assert_eq!(engine.process_start(ADDR_R), ProtocolState::PecError);
    assert!(engine.status().pec_error);
    // The response phase still runs; the master decides what to do.
    assert_eq!(engine.phase(), Phase::TransmittingResponse);
}

#[test]
fn bad_pec_at_stop() {
    let engine = SlaveEngine::<40, 40>::new(true);

    engine.process_start(ADDR_W);
    engine.process_received_byte(0x05);
    engine.process_received_byte(0xDE);

    assert_eq!(engine.process_stop_completed(), ProtocolState::PecError);
    assert!(engine.status().pec_error);
    assert_eq!(engine.phase(), Phase::Idle);
}

#[test]
fn idle_read_arms_one_byte_response() {
    let engine = SlaveEngine::<40, 40>::new(false);
    let slave = SmbusSlave::new(&engine);

    // Application keeps a two-byte answer queued; an Idle->read start is
    // taken as receive-byte and the window narrows to one byte.
    slave.write_response(&[0xAB, 0xCD]).unwrap();
    assert_eq!(engine.process_start(ADDR_R), ProtocolState::Ok);
    assert_eq!(engine.phase(), Phase::TransmittingResponse);

    assert_eq!(engine.process_byte_requested(), 0xAB);
    assert_eq!(engine.process_byte_requested(), NOTHING_TO_REPORT);
    assert_eq!(engine.process_stop_completed(), ProtocolState::Ok);
}

#[test]
fn receive_byte_response_served_until_replaced() {
    let engine = SlaveEngine::<40, 40>::new(false);
    let slave = SmbusSlave::new(&engine);

    slave.write_response(&[0xAB]).unwrap();
    assert_eq!(engine.process_start(ADDR_R), ProtocolState::Ok);
    assert_eq!(engine.process_byte_requested(), 0xAB);
    assert_eq!(engine.process_stop_completed(), ProtocolState::Ok);

    // A second read without a fresh response re-serves the armed byte.
    assert_eq!(engine.process_start(ADDR_R), ProtocolState::Ok);
    assert_eq!(engine.process_byte_requested(), 0xAB);
    assert_eq!(engine.process_stop_completed(), ProtocolState::Ok);

    slave.write_response(&[0xCD]).unwrap();
    assert_eq!(engine.process_start(ADDR_R), ProtocolState::Ok);
    assert_eq!(engine.process_byte_requested(), 0xCD);
}

#[test]
fn unarmed_read_reports_not_ready() {
    let engine = SlaveEngine::<40, 40>::new(false);

    assert_eq!(engine.process_start(ADDR_R), ProtocolState::Ok);
    assert_eq!(engine.process_byte_requested(), NOTHING_TO_REPORT);
    assert_eq!(engine.reported_state(), ProtocolState::SlaveNotReady);
}

#[test]
fn byte_overrun_is_sticky_but_not_fatal() {
    let engine = SlaveEngine::<40, 40>::new(false);
    let slave = SmbusSlave::new(&engine);

    engine.process_start(ADDR_W);
    engine.process_received_byte(0x10);
    // Second byte arrives before the application consumed the first.
    assert_eq!(engine.process_received_byte(0x11), ProtocolState::ByteReceived);
    assert!(engine.status().byte_overrun);

    assert_eq!(slave.take_received_byte(), Some(0x11));
    assert_eq!(slave.take_received_byte(), None);

    assert_eq!(engine.process_stop_completed(), ProtocolState::CommandComplete);
}

#[test]
fn application_fault_invalidates_packet() {
    let engine = SlaveEngine::<40, 40>::new(false);
    let slave = SmbusSlave::new(&engine);

    engine.process_start(ADDR_W);
    assert_eq!(engine.process_received_byte(0xEE), ProtocolState::FirstByte);

    slave.report_error(SlaveFault::Command);
    assert_eq!(engine.phase(), Phase::Error);
    assert!(engine.status().command_error);

    // Remaining bytes of the dead packet are rejected.
    assert_eq!(engine.process_received_byte(0x01), ProtocolState::SlaveError);

    engine.process_stop_completed();
    assert_eq!(engine.phase(), Phase::Idle);
}

#[test]
fn oversized_packet_rejected() {
    let engine = SlaveEngine::<40, 40>::new(false);

    engine.process_start(ADDR_W);
    for i in 0..35u8 {
        assert_eq!(
            engine.process_received_byte(i),
            if i == 0 {
                ProtocolState::FirstByte
            } else {
                ProtocolState::ByteReceived
            }
        );
    }
    assert_eq!(
        engine.process_received_byte(0xFF),
        ProtocolState::DataSizeError
    );
    assert_eq!(engine.phase(), Phase::Error);
    assert!(engine.status().packet_overrun);
}

#[test]
fn timeout_recovers_to_idle() {
    let engine = SlaveEngine::<40, 40>::new(false);
    let mock = MockXcvr::new();

    engine.process_start(ADDR_W);
    engine.process_received_byte(0x10);

    assert_eq!(engine.process_timeout(&mock), ProtocolState::TimeoutError);
    assert_eq!(engine.phase(), Phase::Idle);
    assert!(engine.status().timeout);
    assert_eq!(mock.take(), [HwCall::Disable, HwCall::Enable(false)]);
}

#[test]
fn stray_events_outside_receive_phase() {
    let engine = SlaveEngine::<40, 40>::new(false);

    assert_eq!(engine.process_received_byte(0x10), ProtocolState::SlaveError);
    assert!(engine.status().packet_error);
    assert_eq!(engine.process_byte_requested(), NOTHING_TO_REPORT);
}
