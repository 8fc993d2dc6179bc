use crossbeam::atomic::AtomicCell;
use tilt_packet::{ControlCode, ControlSample, Packet};

use crate::{
    link::{Dialer, TcpDialer},
    lock::LockState,
    session::{SendError, SessionManager, Status},
};

/// The surface the host application talks to.
///
/// Sensor samples and lock changes may arrive from different threads.
pub struct Teleop<D: Dialer = TcpDialer> {
    lock: LockState,
    control_code: AtomicCell<ControlCode>,
    session: SessionManager<D>,
}

impl<D: Dialer> Teleop<D> {
    pub fn new(session: SessionManager<D>, control_code: ControlCode) -> Self {
        Self {
            lock: LockState::new(),
            control_code: AtomicCell::new(control_code),
            session,
        }
    }

    pub fn session(&self) -> &SessionManager<D> {
        &self.session
    }

    pub fn control_code(&self) -> ControlCode {
        self.control_code.load()
    }

    pub fn set_control_code(&self, control_code: ControlCode) {
        self.control_code.store(control_code);
    }

    /// Builds the packet for `sample` from a single read of the lock state.
    pub fn packet_for(&self, sample: ControlSample) -> Packet {
        Packet::new(self.lock.is_locked(), self.control_code(), sample)
    }

    /// Encodes and sends one sample. A failure only drops this sample.
    pub fn on_sensor_sample(&self, sample: ControlSample) -> Result<(), SendError> {
        let packet = self.packet_for(sample);
        self.session.send(&packet)
    }

    pub fn on_lock_state_changed(&self, locked: bool) {
        self.lock.set(locked);
    }

    pub fn deadman(&self, pressed: bool) {
        self.lock.deadman(pressed);
    }

    /// The host lost focus. Motion must stop until the deadman is held again.
    pub fn pause(&self) {
        self.lock.lock();
    }

    pub fn status(&self) -> Status {
        self.session.status()
    }
}

#[cfg(test)]
mod tests {
    use tilt_packet::{ControlCode, ControlSample, Packet, CMD_RUN, CMD_STOP};

    use super::Teleop;
    use crate::{mock::MockDialer, RemoteConfig, SendError, SessionManager};

    fn connected() -> (MockDialer, Teleop<MockDialer>) {
        let dialer = MockDialer::default();
        let session = SessionManager::with_dialer(dialer.clone(), RemoteConfig::new("10.0.0.2", 1025));
        session.connect().unwrap();
        (dialer, Teleop::new(session, ControlCode(0x03)))
    }

    const SAMPLE: ControlSample = ControlSample::new(0.1, -0.2, 9.7);

    #[test]
    fn starts_locked() {
        let (dialer, teleop) = connected();
        teleop.on_sensor_sample(SAMPLE).unwrap();
        let written = dialer.take_written();
        assert_eq!(written[0], CMD_STOP);
        assert_eq!(written[1], 0x03);
        let decoded = Packet::decode(&written).unwrap();
        assert_eq!(decoded.sample, SAMPLE);
    }

    #[test]
    fn deadman_gates_motion() {
        let (dialer, teleop) = connected();

        teleop.deadman(true);
        teleop.on_sensor_sample(SAMPLE).unwrap();
        assert_eq!(dialer.take_written()[0], CMD_RUN);

        teleop.deadman(false);
        teleop.on_sensor_sample(SAMPLE).unwrap();
        assert_eq!(dialer.take_written()[0], CMD_STOP);

        teleop.on_lock_state_changed(false);
        teleop.pause();
        teleop.on_sensor_sample(SAMPLE).unwrap();
        assert_eq!(dialer.take_written()[0], CMD_STOP);
    }

    #[test]
    fn control_code_changes_apply() {
        let (dialer, teleop) = connected();
        teleop.set_control_code(ControlCode(0xa1));
        teleop.on_sensor_sample(SAMPLE).unwrap();
        assert_eq!(dialer.take_written()[1], 0xa1);
    }

    #[test]
    fn disconnected_sample_is_dropped() {
        let dialer = MockDialer::default();
        let session = SessionManager::with_dialer(dialer.clone(), RemoteConfig::default());
        let teleop = Teleop::new(session, ControlCode::default());
        teleop.deadman(true);
        assert!(matches!(
            teleop.on_sensor_sample(SAMPLE),
            Err(SendError::NotConnected)
        ));
        assert!(dialer.take_written().is_empty());
        assert_eq!(dialer.attempts(), 0);
    }
}
