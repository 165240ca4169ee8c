use crate::alarm::Alarms;
use crate::clock::{ClockState, UtcOffset};
use crate::types::Button;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeField {
    Hour,
    Minute,
}

/// In-progress hour/minute pair shared by the time and alarm editors. Values
/// wrap modulo their range; nothing is committed until OK on a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeEditor {
    pub field: TimeField,
    pub hour: u8,
    pub minute: u8,
}

impl TimeEditor {
    fn step_up(&mut self) {
        match self.field {
            TimeField::Hour => self.hour = (self.hour + 1) % 24,
            TimeField::Minute => self.minute = (self.minute + 1) % 60,
        }
    }

    fn step_down(&mut self) {
        match self.field {
            TimeField::Hour => self.hour = (self.hour + 23) % 24,
            TimeField::Minute => self.minute = (self.minute + 59) % 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuState {
    Idle,
    MenuList,
    EditingTime(TimeEditor),
    EditingAlarm { slot: usize, editor: TimeEditor },
    EditingTimezone { minutes: i32 },
    ViewingAlarms,
    DeletingAlarm { candidate: usize },
}

/// What a handled button did, for the loop to render or log. Display text
/// itself comes from `render()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuEffect {
    TimeSet,
    AlarmSet { slot: usize },
    AlarmsDisabled,
    AlarmDeleted { slot: usize },
    TimezoneSet,
    Exited,
}

/// Modal menu over four buttons. Non-blocking by construction: the control
/// loop feeds one button edge at a time and keeps clock, sampling, and
/// transport alive between presses.
#[derive(Debug, Clone)]
pub struct MenuMachine {
    state: MenuState,
    selected: usize,
    capacity: usize,
}

impl MenuMachine {
    pub fn new(alarm_capacity: usize) -> Self {
        Self {
            state: MenuState::Idle,
            selected: 0,
            capacity: alarm_capacity,
        }
    }

    pub fn state(&self) -> MenuState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == MenuState::Idle
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    fn entry_count(&self) -> usize {
        // Set Time, one per alarm slot, Disable, View, Delete, Time Zone.
        self.capacity + 5
    }

    fn entry_label(&self, index: usize) -> String {
        let name = if index == 0 {
            "Set Time".to_string()
        } else if (1..=self.capacity).contains(&index) {
            format!("Set Alarm {index}")
        } else if index == self.capacity + 1 {
            "Disable Alarms".to_string()
        } else if index == self.capacity + 2 {
            "View Alarms".to_string()
        } else if index == self.capacity + 3 {
            "Delete Alarm".to_string()
        } else {
            "Set Time Zone".to_string()
        };
        format!("{} - {name}", index + 1)
    }

    pub fn handle(
        &mut self,
        button: Button,
        alarms: &mut Alarms,
        clock: &mut ClockState,
    ) -> Vec<MenuEffect> {
        match self.state {
            MenuState::Idle => {
                if button == Button::Ok {
                    self.state = MenuState::MenuList;
                }
                Vec::new()
            }
            MenuState::MenuList => self.handle_menu_list(button, alarms, clock),
            MenuState::EditingTime(editor) => self.handle_editing_time(button, editor, clock),
            MenuState::EditingAlarm { slot, editor } => {
                self.handle_editing_alarm(button, slot, editor, alarms)
            }
            MenuState::EditingTimezone { minutes } => {
                self.handle_editing_timezone(button, minutes, clock)
            }
            MenuState::ViewingAlarms => {
                if button == Button::Cancel {
                    self.state = MenuState::MenuList;
                }
                Vec::new()
            }
            MenuState::DeletingAlarm { candidate } => {
                self.handle_deleting_alarm(button, candidate, alarms)
            }
        }
    }

    fn handle_menu_list(
        &mut self,
        button: Button,
        alarms: &mut Alarms,
        clock: &ClockState,
    ) -> Vec<MenuEffect> {
        match button {
            Button::Up => {
                self.selected = (self.selected + 1) % self.entry_count();
                Vec::new()
            }
            Button::Down => {
                self.selected = (self.selected + self.entry_count() - 1) % self.entry_count();
                Vec::new()
            }
            Button::Cancel => {
                self.state = MenuState::Idle;
                vec![MenuEffect::Exited]
            }
            Button::Ok => self.dispatch_entry(alarms, clock),
        }
    }

    fn dispatch_entry(&mut self, alarms: &mut Alarms, clock: &ClockState) -> Vec<MenuEffect> {
        let index = self.selected;
        if index == 0 {
            self.state = MenuState::EditingTime(TimeEditor {
                field: TimeField::Hour,
                hour: clock.reading.hour as u8,
                minute: clock.reading.minute as u8,
            });
        } else if (1..=self.capacity).contains(&index) {
            let slot = index - 1;
            let existing = alarms.slot(slot).and_then(|s| s.time);
            self.state = MenuState::EditingAlarm {
                slot,
                editor: TimeEditor {
                    field: TimeField::Hour,
                    hour: existing.map_or(0, |t| t.hour),
                    minute: existing.map_or(0, |t| t.minute),
                },
            };
        } else if index == self.capacity + 1 {
            alarms.set_enabled(false);
            return vec![MenuEffect::AlarmsDisabled];
        } else if index == self.capacity + 2 {
            self.state = MenuState::ViewingAlarms;
        } else if index == self.capacity + 3 {
            self.state = MenuState::DeletingAlarm { candidate: 0 };
        } else {
            self.state = MenuState::EditingTimezone {
                minutes: clock.utc_offset.minutes(),
            };
        }
        Vec::new()
    }

    fn handle_editing_time(
        &mut self,
        button: Button,
        mut editor: TimeEditor,
        clock: &mut ClockState,
    ) -> Vec<MenuEffect> {
        match button {
            Button::Up => {
                editor.step_up();
                self.state = MenuState::EditingTime(editor);
                Vec::new()
            }
            Button::Down => {
                editor.step_down();
                self.state = MenuState::EditingTime(editor);
                Vec::new()
            }
            Button::Ok => match editor.field {
                TimeField::Hour => {
                    clock.set_hour(editor.hour);
                    editor.field = TimeField::Minute;
                    self.state = MenuState::EditingTime(editor);
                    Vec::new()
                }
                TimeField::Minute => {
                    clock.set_minute(editor.minute);
                    self.state = MenuState::MenuList;
                    vec![MenuEffect::TimeSet]
                }
            },
            Button::Cancel => {
                self.state = MenuState::MenuList;
                Vec::new()
            }
        }
    }

    fn handle_editing_alarm(
        &mut self,
        button: Button,
        slot: usize,
        mut editor: TimeEditor,
        alarms: &mut Alarms,
    ) -> Vec<MenuEffect> {
        match button {
            Button::Up => {
                editor.step_up();
                self.state = MenuState::EditingAlarm { slot, editor };
                Vec::new()
            }
            Button::Down => {
                editor.step_down();
                self.state = MenuState::EditingAlarm { slot, editor };
                Vec::new()
            }
            Button::Ok => match editor.field {
                TimeField::Hour => {
                    // An already-set slot takes the hour immediately; an
                    // empty slot only materializes once the minute field is
                    // committed too, so a half-entered alarm cannot fire.
                    if alarms.slot(slot).is_some_and(|s| s.time.is_some()) {
                        let _ = alarms.set(slot, editor.hour, editor.minute);
                    }
                    editor.field = TimeField::Minute;
                    self.state = MenuState::EditingAlarm { slot, editor };
                    Vec::new()
                }
                TimeField::Minute => {
                    let _ = alarms.set(slot, editor.hour, editor.minute);
                    self.state = MenuState::MenuList;
                    vec![MenuEffect::AlarmSet { slot }]
                }
            },
            Button::Cancel => {
                self.state = MenuState::MenuList;
                Vec::new()
            }
        }
    }

    fn handle_editing_timezone(
        &mut self,
        button: Button,
        minutes: i32,
        clock: &mut ClockState,
    ) -> Vec<MenuEffect> {
        match button {
            Button::Up => {
                self.state = MenuState::EditingTimezone {
                    minutes: UtcOffset::from_minutes(minutes).stepped_up().minutes(),
                };
                Vec::new()
            }
            Button::Down => {
                self.state = MenuState::EditingTimezone {
                    minutes: UtcOffset::from_minutes(minutes).stepped_down().minutes(),
                };
                Vec::new()
            }
            Button::Ok => {
                clock.utc_offset = UtcOffset::from_minutes(minutes);
                self.state = MenuState::MenuList;
                vec![MenuEffect::TimezoneSet]
            }
            Button::Cancel => {
                self.state = MenuState::MenuList;
                Vec::new()
            }
        }
    }

    fn handle_deleting_alarm(
        &mut self,
        button: Button,
        candidate: usize,
        alarms: &mut Alarms,
    ) -> Vec<MenuEffect> {
        match button {
            Button::Up => {
                self.state = MenuState::DeletingAlarm {
                    candidate: (candidate + 1) % self.capacity,
                };
                Vec::new()
            }
            Button::Down => {
                self.state = MenuState::DeletingAlarm {
                    candidate: (candidate + self.capacity - 1) % self.capacity,
                };
                Vec::new()
            }
            Button::Ok => {
                let _ = alarms.delete(candidate);
                self.state = MenuState::MenuList;
                vec![MenuEffect::AlarmDeleted { slot: candidate }]
            }
            Button::Cancel => {
                self.state = MenuState::MenuList;
                Vec::new()
            }
        }
    }

    /// Display lines for the current state. Idle returns nothing; the loop
    /// shows the clock instead.
    pub fn render(&self, alarms: &Alarms) -> Vec<String> {
        match self.state {
            MenuState::Idle => Vec::new(),
            MenuState::MenuList => vec![self.entry_label(self.selected)],
            MenuState::EditingTime(editor) | MenuState::EditingAlarm { editor, .. } => {
                match editor.field {
                    TimeField::Hour => vec![format!("Enter hour: {}", editor.hour)],
                    TimeField::Minute => vec![format!("Enter minutes: {}", editor.minute)],
                }
            }
            MenuState::EditingTimezone { minutes } => {
                vec![format!(
                    "UTC Offset: {}",
                    UtcOffset::from_minutes(minutes).as_hours_string()
                )]
            }
            MenuState::ViewingAlarms => {
                let mut lines: Vec<String> = alarms
                    .slots()
                    .iter()
                    .enumerate()
                    .filter_map(|(i, slot)| {
                        slot.time
                            .map(|t| format!("Alarm {}: {}:{:02}", i + 1, t.hour, t.minute))
                    })
                    .collect();
                if lines.is_empty() {
                    lines.push("No Active Alarms".to_string());
                }
                lines
            }
            MenuState::DeletingAlarm { candidate } => {
                vec![format!("Del Alarm: {}", candidate + 1)]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::AlarmTime;
    use pretty_assertions::assert_eq;

    fn fixture() -> (MenuMachine, Alarms, ClockState) {
        let mut clock = ClockState::default();
        clock.reading.hour = 10;
        clock.reading.minute = 20;
        (MenuMachine::new(2), Alarms::with_capacity(2), clock)
    }

    fn press(
        menu: &mut MenuMachine,
        alarms: &mut Alarms,
        clock: &mut ClockState,
        buttons: &[Button],
    ) -> Vec<MenuEffect> {
        let mut effects = Vec::new();
        for &button in buttons {
            effects.extend(menu.handle(button, alarms, clock));
        }
        effects
    }

    #[test]
    fn ok_opens_menu_and_cancel_closes_it() {
        let (mut menu, mut alarms, mut clock) = fixture();

        assert!(menu.is_idle());
        menu.handle(Button::Ok, &mut alarms, &mut clock);
        assert_eq!(menu.state(), MenuState::MenuList);

        let effects = menu.handle(Button::Cancel, &mut alarms, &mut clock);
        assert_eq!(effects, vec![MenuEffect::Exited]);
        assert!(menu.is_idle());
    }

    #[test]
    fn selection_wraps_both_directions() {
        let (mut menu, mut alarms, mut clock) = fixture();
        menu.handle(Button::Ok, &mut alarms, &mut clock);

        // capacity 2 -> 7 entries.
        menu.handle(Button::Down, &mut alarms, &mut clock);
        assert_eq!(menu.selected(), 6);

        menu.handle(Button::Up, &mut alarms, &mut clock);
        assert_eq!(menu.selected(), 0);
    }

    #[test]
    fn set_time_editor_commits_per_field() {
        let (mut menu, mut alarms, mut clock) = fixture();
        // Open menu, select entry 0, enter editor.
        press(&mut menu, &mut alarms, &mut clock, &[Button::Ok, Button::Ok]);

        // Hour 10 -> 11, commit, then minute 20 -> 19, commit.
        let effects = press(
            &mut menu,
            &mut alarms,
            &mut clock,
            &[Button::Up, Button::Ok, Button::Down, Button::Ok],
        );

        assert_eq!(effects, vec![MenuEffect::TimeSet]);
        assert_eq!(clock.reading.hour, 11);
        assert_eq!(clock.reading.minute, 19);
        assert_eq!(menu.state(), MenuState::MenuList);
    }

    #[test]
    fn cancel_mid_edit_keeps_committed_fields_only() {
        let (mut menu, mut alarms, mut clock) = fixture();
        press(&mut menu, &mut alarms, &mut clock, &[Button::Ok, Button::Ok]);

        // Commit hour 11, bump the minute, then cancel.
        press(
            &mut menu,
            &mut alarms,
            &mut clock,
            &[Button::Up, Button::Ok, Button::Up, Button::Cancel],
        );

        assert_eq!(clock.reading.hour, 11);
        assert_eq!(clock.reading.minute, 20);
        assert_eq!(menu.state(), MenuState::MenuList);
    }

    #[test]
    fn hour_wraps_modulo_24() {
        let (mut menu, mut alarms, mut clock) = fixture();
        clock.reading.hour = 23;
        press(&mut menu, &mut alarms, &mut clock, &[Button::Ok, Button::Ok]);

        menu.handle(Button::Up, &mut alarms, &mut clock);
        match menu.state() {
            MenuState::EditingTime(editor) => assert_eq!(editor.hour, 0),
            other => panic!("unexpected state {other:?}"),
        }

        press(&mut menu, &mut alarms, &mut clock, &[Button::Down, Button::Down]);
        match menu.state() {
            MenuState::EditingTime(editor) => assert_eq!(editor.hour, 22),
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn alarm_editor_creates_slot_on_final_commit() {
        let (mut menu, mut alarms, mut clock) = fixture();
        // Entry 1 = Set Alarm 1.
        press(
            &mut menu,
            &mut alarms,
            &mut clock,
            &[Button::Ok, Button::Up, Button::Ok],
        );
        assert!(matches!(
            menu.state(),
            MenuState::EditingAlarm { slot: 0, .. }
        ));

        // Hour 0 -> 7 (seven ups), commit; empty slot stays empty until the
        // minute is committed.
        for _ in 0..7 {
            menu.handle(Button::Up, &mut alarms, &mut clock);
        }
        menu.handle(Button::Ok, &mut alarms, &mut clock);
        assert_eq!(alarms.slot(0).unwrap().time, None);

        for _ in 0..30 {
            menu.handle(Button::Up, &mut alarms, &mut clock);
        }
        let effects = menu.handle(Button::Ok, &mut alarms, &mut clock);

        assert_eq!(effects, vec![MenuEffect::AlarmSet { slot: 0 }]);
        assert_eq!(
            alarms.slot(0).unwrap().time,
            Some(AlarmTime { hour: 7, minute: 30 })
        );
    }

    #[test]
    fn alarm_hour_commit_applies_to_existing_slot() {
        let (mut menu, mut alarms, mut clock) = fixture();
        alarms.set(0, 7, 30).unwrap();
        alarms.fire(0).unwrap();

        press(
            &mut menu,
            &mut alarms,
            &mut clock,
            &[Button::Ok, Button::Up, Button::Ok],
        );
        // Hour 7 -> 8, commit, then cancel out of the minute field.
        press(
            &mut menu,
            &mut alarms,
            &mut clock,
            &[Button::Up, Button::Ok, Button::Cancel],
        );

        let slot = alarms.slot(0).unwrap();
        assert_eq!(slot.time, Some(AlarmTime { hour: 8, minute: 30 }));
        assert!(!slot.triggered, "re-edit re-arms the slot");
    }

    #[test]
    fn disable_alarms_acts_immediately() {
        let (mut menu, mut alarms, mut clock) = fixture();
        alarms.set(0, 7, 30).unwrap();

        // Entry index 3 = Disable Alarms for capacity 2.
        let effects = press(
            &mut menu,
            &mut alarms,
            &mut clock,
            &[Button::Ok, Button::Up, Button::Up, Button::Up, Button::Ok],
        );

        assert_eq!(effects, vec![MenuEffect::AlarmsDisabled]);
        assert!(!alarms.is_enabled());
        assert_eq!(menu.state(), MenuState::MenuList);
    }

    #[test]
    fn view_alarms_exits_only_on_cancel() {
        let (mut menu, mut alarms, mut clock) = fixture();
        alarms.set(1, 6, 5).unwrap();

        // Entry index 4 = View Alarms.
        press(
            &mut menu,
            &mut alarms,
            &mut clock,
            &[Button::Ok, Button::Down, Button::Down, Button::Down, Button::Ok],
        );
        assert_eq!(menu.state(), MenuState::ViewingAlarms);

        let lines = menu.render(&alarms);
        assert_eq!(lines, vec!["Alarm 2: 6:05".to_string()]);

        menu.handle(Button::Up, &mut alarms, &mut clock);
        menu.handle(Button::Ok, &mut alarms, &mut clock);
        assert_eq!(menu.state(), MenuState::ViewingAlarms);

        menu.handle(Button::Cancel, &mut alarms, &mut clock);
        assert_eq!(menu.state(), MenuState::MenuList);
    }

    #[test]
    fn delete_cycles_candidates_and_deletes_on_ok() {
        let (mut menu, mut alarms, mut clock) = fixture();
        alarms.set(0, 7, 30).unwrap();
        alarms.set(1, 9, 0).unwrap();

        // Entry index 5 = Delete Alarm.
        press(
            &mut menu,
            &mut alarms,
            &mut clock,
            &[Button::Ok, Button::Down, Button::Down, Button::Ok],
        );
        assert_eq!(menu.state(), MenuState::DeletingAlarm { candidate: 0 });

        menu.handle(Button::Up, &mut alarms, &mut clock);
        assert_eq!(menu.state(), MenuState::DeletingAlarm { candidate: 1 });
        menu.handle(Button::Up, &mut alarms, &mut clock);
        assert_eq!(menu.state(), MenuState::DeletingAlarm { candidate: 0 });

        menu.handle(Button::Up, &mut alarms, &mut clock);
        let effects = menu.handle(Button::Ok, &mut alarms, &mut clock);

        assert_eq!(effects, vec![MenuEffect::AlarmDeleted { slot: 1 }]);
        assert_eq!(alarms.slot(1).unwrap().time, None);
        assert_eq!(alarms.slot(0).unwrap().time, Some(AlarmTime { hour: 7, minute: 30 }));
    }

    #[test]
    fn timezone_editor_steps_in_half_hours() {
        let (mut menu, mut alarms, mut clock) = fixture();

        // Entry index 6 = Set Time Zone.
        press(
            &mut menu,
            &mut alarms,
            &mut clock,
            &[Button::Ok, Button::Down, Button::Ok],
        );
        assert_eq!(menu.state(), MenuState::EditingTimezone { minutes: 0 });

        menu.handle(Button::Up, &mut alarms, &mut clock);
        assert_eq!(menu.state(), MenuState::EditingTimezone { minutes: 30 });

        let effects = menu.handle(Button::Ok, &mut alarms, &mut clock);
        assert_eq!(effects, vec![MenuEffect::TimezoneSet]);
        assert_eq!(clock.utc_offset.minutes(), 30);
    }

    #[test]
    fn timezone_cancel_discards_edit() {
        let (mut menu, mut alarms, mut clock) = fixture();
        press(
            &mut menu,
            &mut alarms,
            &mut clock,
            &[Button::Ok, Button::Down, Button::Ok, Button::Up, Button::Cancel],
        );
        assert_eq!(clock.utc_offset.minutes(), 0);
        assert_eq!(menu.state(), MenuState::MenuList);
    }
}
