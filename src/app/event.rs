use crate::irc::connection::ConnectionEvent;

#[derive(Debug)]
pub enum AppEvent {
    /// One line typed by the user
    Input(String),
    /// Standard input reached end of file
    InputClosed,
    /// Socket task report for one of the sessions
    Connection(ConnectionEvent),
}
