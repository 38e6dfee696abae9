//! SMB2 command opcodes and their crediting class.
//!
//! Admission and reclaim special-case a handful of bootstrap commands. The
//! [`CreditClass`] enum is matched once at the top of each crediting
//! operation so the general algorithm stays free of per-command branches.

use derive_more::{From, Into};

/// SMB2 command opcode as carried in the header.
#[derive(Clone, Copy, PartialEq, Eq, Hash, From, Into)]
pub struct Command(u16);

impl Command {
    pub const NEGOTIATE: Self = Self(0x0000);
    pub const SESSION_SETUP: Self = Self(0x0001);
    pub const LOGOFF: Self = Self(0x0002);
    pub const TREE_CONNECT: Self = Self(0x0003);
    pub const TREE_DISCONNECT: Self = Self(0x0004);
    pub const CREATE: Self = Self(0x0005);
    pub const CLOSE: Self = Self(0x0006);
    pub const FLUSH: Self = Self(0x0007);
    pub const READ: Self = Self(0x0008);
    pub const WRITE: Self = Self(0x0009);
    pub const LOCK: Self = Self(0x000A);
    pub const IOCTL: Self = Self(0x000B);
    pub const CANCEL: Self = Self(0x000C);
    pub const ECHO: Self = Self(0x000D);
    pub const QUERY_DIRECTORY: Self = Self(0x000E);
    pub const CHANGE_NOTIFY: Self = Self(0x000F);
    pub const QUERY_INFO: Self = Self(0x0010);
    pub const SET_INFO: Self = Self(0x0011);
    pub const OPLOCK_BREAK: Self = Self(0x0012);

    #[must_use]
    pub const fn new(opcode: u16) -> Self { Self(opcode) }

    #[must_use]
    pub const fn opcode(self) -> u16 { self.0 }

    /// Return the crediting class used to dispatch admission and reclaim.
    #[must_use]
    pub const fn credit_class(self) -> CreditClass {
        match self.0 {
            0x0000 => CreditClass::Negotiate,
            0x0001 => CreditClass::SessionSetup,
            0x0002 => CreditClass::Logoff,
            0x0003 => CreditClass::TreeConnect,
            0x000C => CreditClass::Cancel,
            0x000D => CreditClass::Echo,
            0x0012 => CreditClass::OplockBreak,
            _ => CreditClass::Other,
        }
    }

    /// Report whether requests of this command carry the share's tree id.
    #[must_use]
    pub const fn carries_tree_id(self) -> bool {
        !matches!(self.0, 0x0000..=0x0003 | 0x000D)
    }

    fn name(self) -> Option<&'static str> {
        let name = match self.0 {
            0x0000 => "NEGOTIATE",
            0x0001 => "SESSION_SETUP",
            0x0002 => "LOGOFF",
            0x0003 => "TREE_CONNECT",
            0x0004 => "TREE_DISCONNECT",
            0x0005 => "CREATE",
            0x0006 => "CLOSE",
            0x0007 => "FLUSH",
            0x0008 => "READ",
            0x0009 => "WRITE",
            0x000A => "LOCK",
            0x000B => "IOCTL",
            0x000C => "CANCEL",
            0x000D => "ECHO",
            0x000E => "QUERY_DIRECTORY",
            0x000F => "CHANGE_NOTIFY",
            0x0010 => "QUERY_INFO",
            0x0011 => "SET_INFO",
            0x0012 => "OPLOCK_BREAK",
            _ => return None,
        };
        Some(name)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{:#06x}", self.0),
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Command({self})")
    }
}

/// How a command interacts with the credit ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreditClass {
    /// Resets the ledger and is never charged.
    Negotiate,
    /// Asks for the bootstrap bonus; reply credits are held back until start.
    SessionSetup,
    /// Asks for the bootstrap bonus; bypasses admission during a reconnect trial.
    TreeConnect,
    /// Bypasses admission during a reconnect trial; its reply never moves the ledger.
    Logoff,
    /// Keepalive; must never block for credit.
    Echo,
    /// Reuses its target's message id and is never charged.
    Cancel,
    /// Oplock break acknowledgement.
    OplockBreak,
    /// Every other command.
    Other,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Command::NEGOTIATE, CreditClass::Negotiate)]
    #[case(Command::SESSION_SETUP, CreditClass::SessionSetup)]
    #[case(Command::TREE_CONNECT, CreditClass::TreeConnect)]
    #[case(Command::LOGOFF, CreditClass::Logoff)]
    #[case(Command::ECHO, CreditClass::Echo)]
    #[case(Command::CANCEL, CreditClass::Cancel)]
    #[case(Command::OPLOCK_BREAK, CreditClass::OplockBreak)]
    #[case(Command::READ, CreditClass::Other)]
    #[case(Command::new(0x0099), CreditClass::Other)]
    fn commands_map_to_credit_classes(#[case] command: Command, #[case] class: CreditClass) {
        assert_eq!(command.credit_class(), class);
    }

    #[rstest]
    #[case(Command::NEGOTIATE, false)]
    #[case(Command::TREE_CONNECT, false)]
    #[case(Command::ECHO, false)]
    #[case(Command::CREATE, true)]
    #[case(Command::WRITE, true)]
    fn bootstrap_commands_omit_tree_id(#[case] command: Command, #[case] carries: bool) {
        assert_eq!(command.carries_tree_id(), carries);
    }

    #[test]
    fn unknown_commands_display_as_hex() {
        assert_eq!(Command::new(0x0042).to_string(), "0x0042");
        assert_eq!(Command::READ.to_string(), "READ");
    }
}
