use std::ops::RangeInclusive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Read,
    Write,
    Exec,
}

/// One address watch registered by an external debugger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watch {
    pub id: u32,
    pub enabled: bool,
    pub range: RangeInclusive<u16>,
    pub on_read: bool,
    pub on_write: bool,
    pub on_exec: bool,
    /// Only trigger when the transferred byte equals this value.
    pub value: Option<u8>,
}

impl Watch {
    fn matches(&self, addr: u16, value: u8) -> bool {
        self.range.contains(&addr) && self.value.is_none_or(|v| v == value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchHit {
    pub id: u32,
    pub trigger: Trigger,
    pub addr: u16,
    pub value: u8,
    /// Program counter of the instruction that caused the access, when the
    /// access came from the CPU.
    pub pc: Option<u16>,
}

/// Notification hooks driven from the bus. The `note_*` calls happen before
/// the access they describe completes, so a debugger observing a hit sees
/// the machine state from just before the read or write landed.
#[derive(Debug, Default, Clone)]
pub struct WatchEngine {
    watches: Vec<Watch>,
    has_read: bool,
    has_write: bool,
    has_exec: bool,
    pending_hit: Option<WatchHit>,
}

impl WatchEngine {
    pub fn set_watches(&mut self, watches: Vec<Watch>) {
        self.watches = watches;
        self.has_read = self.watches.iter().any(|w| w.enabled && w.on_read);
        self.has_write = self.watches.iter().any(|w| w.enabled && w.on_write);
        self.has_exec = self.watches.iter().any(|w| w.enabled && w.on_exec);
        self.pending_hit = None;
    }

    pub fn watches(&self) -> &[Watch] {
        &self.watches
    }

    pub fn take_hit(&mut self) -> Option<WatchHit> {
        self.pending_hit.take()
    }

    pub fn note_read(&mut self, pc: Option<u16>, addr: u16, value: u8) {
        if !self.has_read || self.pending_hit.is_some() {
            return;
        }
        self.record(Trigger::Read, |w| w.on_read, pc, addr, value);
    }

    pub fn note_write(&mut self, pc: Option<u16>, addr: u16, value: u8) {
        if !self.has_write || self.pending_hit.is_some() {
            return;
        }
        self.record(Trigger::Write, |w| w.on_write, pc, addr, value);
    }

    /// Called with the PC and opcode byte before the instruction executes.
    pub fn note_exec(&mut self, pc: u16, opcode: u8) {
        if !self.has_exec || self.pending_hit.is_some() {
            return;
        }
        self.record(Trigger::Exec, |w| w.on_exec, Some(pc), pc, opcode);
    }

    fn record(
        &mut self,
        trigger: Trigger,
        wants: impl Fn(&Watch) -> bool,
        pc: Option<u16>,
        addr: u16,
        value: u8,
    ) {
        for w in &self.watches {
            if !w.enabled || !wants(w) || !w.matches(addr, value) {
                continue;
            }
            self.pending_hit = Some(WatchHit {
                id: w.id,
                trigger,
                addr,
                value,
                pc,
            });
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watch(id: u32, range: RangeInclusive<u16>) -> Watch {
        Watch {
            id,
            enabled: true,
            range,
            on_read: false,
            on_write: false,
            on_exec: false,
            value: None,
        }
    }

    #[test]
    fn read_hit_records_details() {
        let mut engine = WatchEngine::default();
        let mut w = watch(1, 0xC000..=0xC000);
        w.on_read = true;
        engine.set_watches(vec![w]);

        engine.note_read(Some(0x0100), 0xC000, 0x12);
        assert_eq!(
            engine.take_hit(),
            Some(WatchHit {
                id: 1,
                trigger: Trigger::Read,
                addr: 0xC000,
                value: 0x12,
                pc: Some(0x0100),
            })
        );
        assert_eq!(engine.take_hit(), None);
    }

    #[test]
    fn value_filter_gates_hits() {
        let mut engine = WatchEngine::default();
        let mut w = watch(1, 0xC000..=0xC0FF);
        w.on_write = true;
        w.value = Some(0xAA);
        engine.set_watches(vec![w]);

        engine.note_write(Some(0x0100), 0xC010, 0x12);
        assert_eq!(engine.take_hit(), None);

        engine.note_write(Some(0x0100), 0xC010, 0xAA);
        assert!(engine.take_hit().is_some());
    }

    #[test]
    fn exec_hit_carries_pc_and_opcode() {
        let mut engine = WatchEngine::default();
        let mut w = watch(9, 0x0150..=0x0150);
        w.on_exec = true;
        engine.set_watches(vec![w]);

        engine.note_exec(0x0150, 0x3E);
        let hit = engine.take_hit().unwrap();
        assert_eq!(hit.trigger, Trigger::Exec);
        assert_eq!(hit.addr, 0x0150);
        assert_eq!(hit.value, 0x3E);
        assert_eq!(hit.pc, Some(0x0150));
    }

    #[test]
    fn first_hit_is_kept_until_taken() {
        let mut engine = WatchEngine::default();
        let mut w = watch(1, 0xC000..=0xCFFF);
        w.on_write = true;
        engine.set_watches(vec![w]);

        engine.note_write(None, 0xC000, 0x01);
        engine.note_write(None, 0xC001, 0x02);
        let hit = engine.take_hit().unwrap();
        assert_eq!(hit.addr, 0xC000);
    }

    #[test]
    fn disabled_watch_never_fires() {
        let mut engine = WatchEngine::default();
        let mut w = watch(1, 0xC000..=0xC000);
        w.on_read = true;
        w.enabled = false;
        engine.set_watches(vec![w]);

        engine.note_read(None, 0xC000, 0x12);
        assert_eq!(engine.take_hit(), None);
    }
}
