//! Controller and program state at a start position.

use sp_ir::{Event, EventKind};

/// Channel mode messages (120..=127) are never chased.
const FIRST_MODE_CONTROLLER: u8 = 120;

/// Events that restore, at `tick`, the last program and controller
/// values set on each channel before `tick`.
///
/// Per channel the program comes first, then controllers in ascending
/// number. Channels are emitted in order 0..16.
pub fn chase_events(events: &[Event], tick: u64) -> Vec<Event> {
    let mut programs = [None::<u8>; 16];
    let mut controllers = vec![[None::<u8>; 128]; 16];

    for event in events.iter().take_while(|e| e.tick < tick) {
        match event.kind {
            EventKind::ProgramChange { channel, program } => {
                programs[channel as usize & 0x0F] = Some(program);
            }
            EventKind::Controller { channel, param, value } if param < FIRST_MODE_CONTROLLER => {
                controllers[channel as usize & 0x0F][param as usize & 0x7F] = Some(value);
            }
            _ => {}
        }
    }

    let mut out = Vec::new();
    for channel in 0..16u8 {
        if let Some(program) = programs[channel as usize] {
            out.push(Event::new(tick, EventKind::ProgramChange { channel, program }));
        }
        for (param, value) in controllers[channel as usize].iter().enumerate() {
            if let Some(value) = *value {
                out.push(Event::new(
                    tick,
                    EventKind::Controller { channel, param: param as u8, value },
                ));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn keeps_latest_values_only() {
        let events = vec![
            Event::new(0, EventKind::ProgramChange { channel: 1, program: 10 }),
            Event::new(0, EventKind::Controller { channel: 1, param: 7, value: 100 }),
            Event::new(10, EventKind::Controller { channel: 1, param: 7, value: 80 }),
            Event::new(10, EventKind::Controller { channel: 0, param: 10, value: 0 }),
            Event::new(20, EventKind::ProgramChange { channel: 1, program: 11 }),
            Event::new(20, EventKind::Controller { channel: 1, param: 0x7B, value: 0 }),
            Event::new(50, EventKind::ProgramChange { channel: 1, program: 12 }),
        ];
        assert_eq!(
            chase_events(&events, 50),
            vec![
                Event::new(50, EventKind::Controller { channel: 0, param: 10, value: 0 }),
                Event::new(50, EventKind::ProgramChange { channel: 1, program: 11 }),
                Event::new(50, EventKind::Controller { channel: 1, param: 7, value: 80 }),
            ]
        );
    }

    #[test]
    fn nothing_to_chase_at_start() {
        let events = vec![Event::new(0, EventKind::ProgramChange { channel: 0, program: 1 })];
        assert!(chase_events(&events, 0).is_empty());
    }
}
