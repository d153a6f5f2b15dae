use std::time::Duration;
use tracing::trace;

use crate::domain::{Action, DashConfig, DashError, Message};
use ratatui::crossterm::event::{self, Event, KeyCode};

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(cfg: &DashConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
        }
    }

    pub fn handle_event(&self) -> Result<Option<Message>, DashError> {
        if event::poll(Duration::from_millis(self.event_poll_time))? {
            return Ok(match event::read()? {
                Event::Key(key) if key.kind == event::KeyEventKind::Press => self.handle_key(key),
                Event::Resize(width, height) => {
                    Some(Message::Resize(width as usize, height as usize))
                }
                _ => None,
            });
        }
        Ok(None)
    }

    fn handle_key(&self, key: event::KeyEvent) -> Option<Message> {
        let message = match key.code {
            KeyCode::Char('q') => Some(Message::Quit),
            KeyCode::Up | KeyCode::Char('k') => Some(Message::FocusUp),
            KeyCode::Down | KeyCode::Char('j') => Some(Message::FocusDown),
            KeyCode::Left | KeyCode::Char('h') => Some(Message::SelectPrev),
            KeyCode::Right | KeyCode::Char('l') => Some(Message::SelectNext),
            KeyCode::Enter | KeyCode::Char('s') => Some(Message::Action(Action::Search)),
            KeyCode::Char('r') => Some(Message::Action(Action::Reset)),
            KeyCode::Char('a') => Some(Message::Action(Action::Average)),
            KeyCode::Char('d') => Some(Message::Summary),
            KeyCode::Char('?') => Some(Message::Help),
            KeyCode::Esc => Some(Message::Exit),
            KeyCode::PageUp => Some(Message::ScrollUp),
            KeyCode::PageDown => Some(Message::ScrollDown),
            KeyCode::Home => Some(Message::ScrollBeginning),
            KeyCode::End => Some(Message::ScrollEnd),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::{KeyEvent, KeyModifiers};

    fn press(code: KeyCode) -> Option<Message> {
        let controller = Controller::new(&DashConfig::default());
        controller.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn maps_action_keys() {
        assert_eq!(press(KeyCode::Enter), Some(Message::Action(Action::Search)));
        assert_eq!(press(KeyCode::Char('s')), Some(Message::Action(Action::Search)));
        assert_eq!(press(KeyCode::Char('r')), Some(Message::Action(Action::Reset)));
        assert_eq!(press(KeyCode::Char('a')), Some(Message::Action(Action::Average)));
    }

    #[test]
    fn maps_navigation_keys() {
        assert_eq!(press(KeyCode::Char('q')), Some(Message::Quit));
        assert_eq!(press(KeyCode::Down), Some(Message::FocusDown));
        assert_eq!(press(KeyCode::Char('h')), Some(Message::SelectPrev));
        assert_eq!(press(KeyCode::Esc), Some(Message::Exit));
        assert_eq!(press(KeyCode::Char('x')), None);
    }
}
