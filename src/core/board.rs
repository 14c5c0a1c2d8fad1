use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::api::backend::BackendClient;
use crate::auth::resolver::{AuthResolver, Decision, SaveOutcome};
use crate::machine::controller::MachinePowerController;
use crate::models::card::{Uid, UserLevel};
use crate::persist::snapshot::CacheStore;
use crate::rfid::reader::RfidReader;
use crate::utils::time::{elapsed_since, Clock, MonotonicClock};

/// What the board currently shows to the person at the machine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Status {
    #[default]
    Clear,
    Free,
    Verifying,
    LoggedIn,
    LoginDenied,
    Logout,
    AlreadyInUse,
    NotAllowed,
    MaintenanceNeeded,
    MaintenanceDone,
    ShutdownImminent,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Periods of the board loop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoardTiming {
    pub tick: Duration,
    /// Machine status refresh from the backend, zero disables it
    pub refresh: Duration,
    /// Keep-alive ping, zero disables it
    pub alive: Duration,
}

/// Fixed-tick loop wiring the reader, the resolver and the power controller
pub struct Board<B: BackendClient, C: Clock + Clone = MonotonicClock> {
    auth: AuthResolver,
    machine: MachinePowerController<C>,
    backend: B,
    rfid: Box<dyn RfidReader>,
    store: Box<dyn CacheStore>,
    clock: C,
    timing: BoardTiming,
    status: Status,
    last_refresh: Option<Instant>,
    last_alive: Option<Instant>,
}

impl<B: BackendClient, C: Clock + Clone> Board<B, C> {
    /// Restore the cache and force the machine off
    pub fn new(
        mut auth: AuthResolver,
        mut machine: MachinePowerController<C>,
        mut backend: B,
        rfid: Box<dyn RfidReader>,
        store: Box<dyn CacheStore>,
        clock: C,
        timing: BoardTiming,
    ) -> Self {
        auth.load_cache(store.as_ref());
        machine.power(false, &mut backend);

        let mut board = Self {
            auth,
            machine,
            backend,
            rfid,
            store,
            clock,
            timing,
            status: Status::Clear,
            last_refresh: None,
            last_alive: None,
        };
        board.change_status(Status::Free);
        board
    }

    /// Run forever, or for `max_ticks` iterations
    pub fn run(&mut self, max_ticks: Option<u64>) {
        let mut ticks = 0u64;
        loop {
            self.tick();
            ticks += 1;
            if max_ticks.is_some_and(|max| ticks >= max) {
                break;
            }
            self.clock.sleep(self.timing.tick);
        }
    }

    /// One pass over every periodic check
    pub fn tick(&mut self) {
        self.check_rfid();
        self.check_autologoff();
        self.check_shutdown_warning();
        self.check_power_off();

        let now = self.clock.now();
        if is_due(self.last_refresh, self.timing.refresh, now) {
            self.last_refresh = Some(now);
            self.refresh_from_server();
        }
        if is_due(self.last_alive, self.timing.alive, now) {
            self.last_alive = Some(now);
            self.keep_alive();
        }
    }

    pub fn check_rfid(&mut self) {
        if !self.rfid.is_new_card_present() {
            return;
        }
        if !self.rfid.read_card_serial() {
            debug!("Card present but serial read failed");
            return;
        }

        let uid = self.rfid.uid();
        if uid.is_valid() {
            self.on_new_card(uid);
        }
    }

    /// Tap handling: the holder logs out, anyone else must authorize
    pub fn on_new_card(&mut self, uid: Uid) {
        info!(uid = %uid, "Card presented");

        if let Some(holder) = self.machine.active_user().map(|user| user.uid) {
            if holder == uid {
                self.logout();
            } else {
                self.change_status(Status::AlreadyInUse);
            }
            return;
        }

        self.authorize(uid);
    }

    /// Check the card and start a session when it is granted
    pub fn authorize(&mut self, uid: Uid) -> bool {
        self.change_status(Status::Verifying);

        let decision = self.auth.try_login(uid, &mut self.backend);
        self.save_cache();

        let user = match decision {
            Decision::Authorized(user) => user,
            refused => {
                info!(uid = %uid, decision = ?refused, "Login denied");
                self.change_status(Status::LoginDenied);
                return false;
            }
        };

        if self.machine.maintenance_needed() {
            if user.level < UserLevel::Staff {
                self.change_status(Status::MaintenanceNeeded);
                return false;
            }
            let reply = self.backend.register_maintenance(uid, self.machine.machine_id());
            info!(uid = %uid, acknowledged = reply.request_ok, "Maintenance registered");
            self.machine.set_maintenance_needed(false);
            self.change_status(Status::MaintenanceDone);
        }

        if !self.machine.login(user, &mut self.backend) {
            self.change_status(Status::NotAllowed);
            return false;
        }

        let reply = self.backend.start_use(uid, self.machine.machine_id());
        if !reply.request_ok {
            debug!(uid = %uid, "Usage start not acknowledged by backend");
        }
        self.change_status(Status::LoggedIn);
        true
    }

    /// End the current session and report its duration
    pub fn logout(&mut self) {
        let Some(uid) = self.machine.active_user().map(|user| user.uid) else {
            return;
        };
        let duration = self.machine.usage_duration();

        self.machine.logout(&mut self.backend);

        let reply = self.backend.finish_use(uid, self.machine.machine_id(), duration);
        if !reply.request_ok {
            debug!(uid = %uid, "Usage end not acknowledged by backend");
        }
        self.change_status(Status::Logout);
    }

    pub fn check_power_off(&mut self) {
        if self.machine.can_power_off() {
            info!(machine = %self.machine.machine_name(), "Grace period over, powering off");
            self.machine.power(false, &mut self.backend);
            self.change_status(Status::Free);
        }
    }

    pub fn check_autologoff(&mut self) {
        if self.machine.is_autologoff_expired() {
            warn!(
                user = ?self.machine.active_user().map(|u| u.holder_name.as_str()),
                usage_secs = self.machine.usage_duration().as_secs(),
                "Auto-logging out user"
            );
            self.logout();
        }
    }

    pub fn check_shutdown_warning(&mut self) {
        if self.machine.is_shutdown_imminent() && self.status != Status::ShutdownImminent {
            warn!(machine = %self.machine.machine_name(), "Machine is about to shut down");
            self.change_status(Status::ShutdownImminent);
        }
    }

    /// Pull machine permissions and autologoff delay from the backend
    pub fn refresh_from_server(&mut self) {
        if !self.backend.is_online() && !self.backend.connect() {
            debug!("Backend offline, keeping local machine settings");
            return;
        }

        let reply = self.backend.check_machine(self.machine.machine_id());
        if !reply.request_ok || !reply.is_valid {
            debug!(request_ok = reply.request_ok, "Machine refresh inconclusive");
            return;
        }

        self.machine.set_allowed(reply.allowed);
        self.machine.set_maintenance_needed(reply.maintenance);
        if let Some(minutes) = reply.logoff_minutes {
            match minutes.checked_mul(60) {
                Some(secs) => self.machine.set_autologoff(Duration::from_secs(secs)),
                None => warn!(logoff_minutes = minutes, "Ignoring out of range autologoff delay"),
            }
        }

        debug!(
            allowed = reply.allowed,
            maintenance = reply.maintenance,
            logoff_minutes = ?reply.logoff_minutes,
            "Machine settings refreshed"
        );
    }

    pub fn keep_alive(&mut self) {
        if self.backend.is_online() {
            let reply = self.backend.alive(self.machine.machine_id());
            if !reply.request_ok {
                debug!("Keep-alive not acknowledged");
            }
        }
    }

    fn save_cache(&mut self) {
        match self.auth.save_cache(self.store.as_ref()) {
            Ok(SaveOutcome::Written) => debug!("Cache snapshot updated"),
            Ok(SaveOutcome::Unchanged) => {}
            Err(e) => warn!(error = %e, "Cache not persisted, continuing with in-memory cache"),
        }
    }

    fn change_status(&mut self, status: Status) {
        if self.status != status {
            info!(from = %self.status, to = %status, "Board status changed");
            self.status = status;
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn machine(&self) -> &MachinePowerController<C> {
        &self.machine
    }

    pub fn auth(&self) -> &AuthResolver {
        &self.auth
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

fn is_due(last: Option<Instant>, period: Duration, now: Instant) -> bool {
    if period.is_zero() {
        return false;
    }
    last.map_or(true, |last| elapsed_since(last, now) >= period)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::messages::{MachineResponse, UserResponse};
    use crate::api::mock::{MockBackend, UsageEvent};
    use crate::machine::relay::RecordingPin;
    use crate::models::machine::{MachineConfig, MachineId, PowerState, RelayActuation, RetryPolicy};
    use crate::models::user::WhiteListEntry;
    use crate::core::error::PersistError;
    use crate::persist::snapshot::{CacheSnapshot, MemoryCacheStore};
    use crate::utils::time::ManualClock;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    const MINUTE: Duration = Duration::from_secs(60);
    const MEMBER: Uid = Uid::new(0xF6F07894);
    const OTHER: Uid = Uid::new(0xAABBCCDD);

    /// Reader fed from the test body
    #[derive(Clone, Default)]
    struct QueueReader {
        taps: Rc<RefCell<VecDeque<Uid>>>,
        current: Uid,
    }

    impl QueueReader {
        fn tap(&self, uid: Uid) {
            self.taps.borrow_mut().push_back(uid);
        }
    }

    impl RfidReader for QueueReader {
        fn is_new_card_present(&mut self) -> bool {
            match self.taps.borrow_mut().pop_front() {
                Some(uid) => {
                    self.current = uid;
                    true
                }
                None => false,
            }
        }

        fn read_card_serial(&mut self) -> bool {
            true
        }

        fn uid(&self) -> Uid {
            self.current
        }
    }

    fn board(backend: MockBackend) -> (Board<MockBackend, Rc<ManualClock>>, Rc<ManualClock>, QueueReader, RecordingPin) {
        let clock = Rc::new(ManualClock::new());
        let pin = RecordingPin::new();
        let reader = QueueReader::default();
        let config = MachineConfig {
            machine_id: MachineId(9),
            machine_name: "Mill".to_string(),
            autologoff: 30 * MINUTE,
            grace_period: 2 * MINUTE,
            warning_lead: MINUTE,
            relay: Some(RelayActuation { pin: 5, active_low: false }),
            mqtt: None,
            retry: RetryPolicy::default(),
        };
        let machine = MachinePowerController::with_output(config, Rc::clone(&clock), Some(Box::new(pin.clone())));
        let auth = AuthResolver::new(vec![WhiteListEntry::new(MEMBER, UserLevel::User, "Member")], 4);
        let timing = BoardTiming {
            tick: Duration::from_millis(100),
            refresh: MINUTE,
            alive: Duration::ZERO,
        };
        let board = Board::new(
            auth,
            machine,
            backend,
            Box::new(reader.clone()),
            Box::new(MemoryCacheStore::new(4)),
            Rc::clone(&clock),
            timing,
        );
        (board, clock, reader, pin)
    }

    #[test]
    fn test_startup_powers_off() {
        let (board, _clock, _reader, pin) = board(MockBackend::offline());
        assert_eq!(board.machine().power_state(), PowerState::PoweredOff);
        assert_eq!(pin.levels(), vec![false]);
        assert_eq!(board.status(), Status::Free);
    }

    #[test]
    fn test_tap_login_and_logout() {
        let (mut board, clock, reader, pin) = board(MockBackend::offline());

        reader.tap(MEMBER);
        board.tick();
        assert_eq!(board.status(), Status::LoggedIn);
        assert_eq!(pin.last(), Some(true));

        clock.advance(MINUTE);
        reader.tap(MEMBER);
        board.tick();
        assert_eq!(board.status(), Status::Logout);
        assert!(board.machine().is_free());
        assert_eq!(board.machine().power_state(), PowerState::WaitingForPowerOff);

        clock.advance(2 * MINUTE);
        board.tick();
        assert_eq!(board.status(), Status::Free);
        assert_eq!(pin.last(), Some(false));
    }

    #[test]
    fn test_other_card_while_busy() {
        let (mut board, _clock, reader, _pin) = board(MockBackend::offline());
        reader.tap(MEMBER);
        board.tick();

        reader.tap(OTHER);
        board.tick();
        assert_eq!(board.status(), Status::AlreadyInUse);
        assert_eq!(board.machine().active_user().unwrap().uid, MEMBER);
    }

    #[test]
    fn test_unknown_card_denied() {
        let (mut board, _clock, reader, pin) = board(MockBackend::offline());
        reader.tap(OTHER);
        board.tick();

        assert_eq!(board.status(), Status::LoginDenied);
        assert_eq!(pin.levels(), vec![false]);
    }

    #[test]
    fn test_usage_reported_to_backend() {
        let backend = MockBackend::online().with_card(OTHER, UserResponse::authorized("Grace", UserLevel::User));
        let (mut board, clock, _reader, _pin) = board(backend);

        assert!(board.authorize(OTHER));
        clock.advance(5 * MINUTE);
        board.logout();

        assert_eq!(
            board.backend().usage,
            vec![
                UsageEvent::Start { uid: OTHER, machine_id: MachineId(9) },
                UsageEvent::Finish { uid: OTHER, machine_id: MachineId(9), duration: 5 * MINUTE },
            ]
        );
    }

    #[test]
    fn test_autologoff_ends_session() {
        let (mut board, clock, reader, _pin) = board(MockBackend::offline());
        reader.tap(MEMBER);
        board.tick();

        clock.advance(31 * MINUTE);
        board.tick();
        assert!(board.machine().is_free());
        assert_eq!(board.machine().power_state(), PowerState::WaitingForPowerOff);
    }

    #[test]
    fn test_shutdown_warning_status() {
        let (mut board, clock, reader, _pin) = board(MockBackend::offline());
        reader.tap(MEMBER);
        board.tick();
        reader.tap(MEMBER);
        board.tick();

        clock.advance(MINUTE);
        board.tick();
        assert_eq!(board.status(), Status::ShutdownImminent);

        clock.advance(MINUTE);
        board.tick();
        assert_eq!(board.status(), Status::Free);
    }

    #[test]
    fn test_refresh_blocks_machine() {
        let mut backend = MockBackend::online();
        backend.machine_reply = MachineResponse {
            request_ok: true,
            is_valid: true,
            allowed: false,
            maintenance: false,
            logoff_minutes: Some(10),
            name: "Mill".to_string(),
        };
        let (mut board, _clock, reader, _pin) = board(backend);

        board.tick();
        assert!(!board.machine().is_allowed());
        assert_eq!(board.machine().config().autologoff, 10 * MINUTE);

        board.backend_mut().set_card(MEMBER, UserResponse::authorized("Member", UserLevel::User));
        reader.tap(MEMBER);
        board.tick();
        assert_eq!(board.status(), Status::NotAllowed);
        assert!(board.machine().is_free());
    }

    #[test]
    fn test_refresh_ignores_oversized_logoff() {
        let mut backend = MockBackend::online();
        backend.machine_reply = MachineResponse {
            request_ok: true,
            is_valid: true,
            allowed: true,
            maintenance: false,
            logoff_minutes: Some(u64::MAX / 30),
            name: "Mill".to_string(),
        };
        let (mut board, _clock, _reader, _pin) = board(backend);

        board.refresh_from_server();

        assert!(board.machine().is_allowed());
        assert_eq!(board.machine().config().autologoff, 30 * MINUTE);
    }

    #[test]
    fn test_maintenance_requires_staff() {
        let mut backend = MockBackend::online()
            .with_card(MEMBER, UserResponse::authorized("Member", UserLevel::User))
            .with_card(OTHER, UserResponse::authorized("Tech", UserLevel::Staff));
        backend.machine_reply = MachineResponse {
            request_ok: true,
            is_valid: true,
            allowed: true,
            maintenance: true,
            logoff_minutes: None,
            name: String::new(),
        };
        let (mut board, _clock, _reader, _pin) = board(backend);
        board.refresh_from_server();

        assert!(!board.authorize(MEMBER));
        assert_eq!(board.status(), Status::MaintenanceNeeded);

        assert!(board.authorize(OTHER));
        assert!(!board.machine().maintenance_needed());
        assert!(board
            .backend()
            .usage
            .contains(&UsageEvent::Maintenance { uid: OTHER, machine_id: MachineId(9) }));
    }

    struct ReadOnlyStore;

    impl CacheStore for ReadOnlyStore {
        fn load_snapshot(&self) -> Option<CacheSnapshot> {
            None
        }

        fn default_snapshot(&self) -> CacheSnapshot {
            CacheSnapshot::empty(4)
        }

        fn save_snapshot(&self, _snapshot: &CacheSnapshot) -> Result<(), PersistError> {
            Err(PersistError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only medium",
            )))
        }
    }

    #[test]
    fn test_login_survives_cache_write_failure() {
        let clock = Rc::new(ManualClock::new());
        let config = MachineConfig {
            machine_id: MachineId(9),
            machine_name: "Mill".to_string(),
            autologoff: 30 * MINUTE,
            grace_period: 2 * MINUTE,
            warning_lead: MINUTE,
            relay: Some(RelayActuation { pin: 5, active_low: false }),
            mqtt: None,
            retry: RetryPolicy::default(),
        };
        let machine = MachinePowerController::with_output(config, Rc::clone(&clock), Some(Box::new(RecordingPin::new())));
        let backend = MockBackend::online().with_card(OTHER, UserResponse::authorized("Grace", UserLevel::User));
        let mut board = Board::new(
            AuthResolver::new(Vec::new(), 4),
            machine,
            backend,
            Box::new(QueueReader::default()),
            Box::new(ReadOnlyStore),
            Rc::clone(&clock),
            BoardTiming {
                tick: Duration::from_millis(100),
                refresh: Duration::ZERO,
                alive: Duration::ZERO,
            },
        );

        assert!(board.authorize(OTHER));
        assert_eq!(board.status(), Status::LoggedIn);
        assert!(board.auth().lookup_cache(OTHER).is_some());
    }

    #[test]
    fn test_is_due() {
        let clock = ManualClock::new();
        let now = clock.now();
        assert!(is_due(None, MINUTE, now));
        assert!(!is_due(None, Duration::ZERO, now));
        assert!(!is_due(Some(now), MINUTE, now));
        clock.advance(MINUTE);
        assert!(is_due(Some(now), MINUTE, clock.now()));
    }
}
