//! Abstract key-code -> platform virtual-key lookup table.
//!
//! Grounded in the teacher's `hid/keymap.rs` JS-keycode-to-USB-HID table: a
//! fixed-size array built once, indexed in O(1), rather than a match
//! expression or a runtime `HashMap`. The wire protocol's `key_code` values
//! are a small fixed abstract keyboard-event set (not USB HID usages), so
//! the table here maps directly to Win32 virtual-key codes.

/// Abstract key codes carried on the wire, matching
/// `RemoteInputSimulator::handleKeyboardEvent`'s fixed key set.
pub mod abstract_key {
    pub const BACKSPACE: u32 = 1;
    pub const TAB: u32 = 2;
    pub const ENTER: u32 = 3;
    pub const SHIFT: u32 = 4;
    pub const CONTROL: u32 = 5;
    pub const ALT: u32 = 6;
    pub const ESCAPE: u32 = 7;
    pub const SPACE: u32 = 8;
    pub const LEFT: u32 = 9;
    pub const UP: u32 = 10;
    pub const RIGHT: u32 = 11;
    pub const DOWN: u32 = 12;
    pub const DELETE: u32 = 13;
    pub const HOME: u32 = 14;
    pub const END: u32 = 15;
    pub const CAPS_LOCK: u32 = 52;
    pub const INSERT: u32 = 53;
    pub const PAGE_UP: u32 = 54;
    pub const PAGE_DOWN: u32 = 55;
    pub const COMMA: u32 = 68;
    pub const PERIOD: u32 = 69;
    pub const SLASH: u32 = 70;
    pub const SEMICOLON: u32 = 71;
    pub const QUOTE: u32 = 72;
    pub const LEFT_BRACKET: u32 = 73;
    pub const RIGHT_BRACKET: u32 = 74;
    pub const BACKSLASH: u32 = 75;
    // 16..=41 map onto 'A'..'Z'; 42..=51 map onto '0'..'9'; 56..=67 map onto
    // F1..F12.
    pub const A: u32 = 16;
    pub const ZERO: u32 = 42;
    pub const F1: u32 = 56;
}

const TABLE_LEN: usize = 256;

/// Win32 virtual-key constants this table resolves into, kept local so this
/// module has no compile-time dependency on the `windows` crate — only the
/// platform-specific injector needs that.
const VK_BACK: u8 = 0x08;
const VK_TAB: u8 = 0x09;
const VK_RETURN: u8 = 0x0D;
const VK_SHIFT: u8 = 0x10;
const VK_CONTROL: u8 = 0x11;
const VK_MENU: u8 = 0x12;
const VK_ESCAPE: u8 = 0x1B;
const VK_SPACE: u8 = 0x20;
const VK_LEFT: u8 = 0x25;
const VK_UP: u8 = 0x26;
const VK_RIGHT: u8 = 0x27;
const VK_DOWN: u8 = 0x28;
const VK_DELETE: u8 = 0x2E;
const VK_HOME: u8 = 0x24;
const VK_END: u8 = 0x23;
const VK_CAPITAL: u8 = 0x14;
const VK_INSERT: u8 = 0x2D;
const VK_PRIOR: u8 = 0x21; // Page Up
const VK_NEXT: u8 = 0x22; // Page Down
const VK_F1: u8 = 0x70;
const VK_OEM_COMMA: u8 = 0xBC;
const VK_OEM_PERIOD: u8 = 0xBE;
const VK_OEM_2: u8 = 0xBF; // '/'
const VK_OEM_1: u8 = 0xBA; // ';'
const VK_OEM_7: u8 = 0xDE; // '\''
const VK_OEM_4: u8 = 0xDB; // '['
const VK_OEM_6: u8 = 0xDD; // ']'
const VK_OEM_5: u8 = 0xDC; // '\\'

const fn build_table() -> [u8; TABLE_LEN] {
    let mut table = [0u8; TABLE_LEN];
    table[abstract_key::BACKSPACE as usize] = VK_BACK;
    table[abstract_key::TAB as usize] = VK_TAB;
    table[abstract_key::ENTER as usize] = VK_RETURN;
    table[abstract_key::SHIFT as usize] = VK_SHIFT;
    table[abstract_key::CONTROL as usize] = VK_CONTROL;
    table[abstract_key::ALT as usize] = VK_MENU;
    table[abstract_key::ESCAPE as usize] = VK_ESCAPE;
    table[abstract_key::SPACE as usize] = VK_SPACE;
    table[abstract_key::LEFT as usize] = VK_LEFT;
    table[abstract_key::UP as usize] = VK_UP;
    table[abstract_key::RIGHT as usize] = VK_RIGHT;
    table[abstract_key::DOWN as usize] = VK_DOWN;
    table[abstract_key::DELETE as usize] = VK_DELETE;
    table[abstract_key::HOME as usize] = VK_HOME;
    table[abstract_key::END as usize] = VK_END;
    table[abstract_key::CAPS_LOCK as usize] = VK_CAPITAL;
    table[abstract_key::INSERT as usize] = VK_INSERT;
    table[abstract_key::PAGE_UP as usize] = VK_PRIOR;
    table[abstract_key::PAGE_DOWN as usize] = VK_NEXT;
    table[abstract_key::COMMA as usize] = VK_OEM_COMMA;
    table[abstract_key::PERIOD as usize] = VK_OEM_PERIOD;
    table[abstract_key::SLASH as usize] = VK_OEM_2;
    table[abstract_key::SEMICOLON as usize] = VK_OEM_1;
    table[abstract_key::QUOTE as usize] = VK_OEM_7;
    table[abstract_key::LEFT_BRACKET as usize] = VK_OEM_4;
    table[abstract_key::RIGHT_BRACKET as usize] = VK_OEM_6;
    table[abstract_key::BACKSLASH as usize] = VK_OEM_5;

    // 'A'..'Z' sit at ASCII 0x41..0x5A on Win32 too, so the abstract range
    // 16..=41 maps directly onto it.
    let mut i = 0u32;
    while i < 26 {
        table[(abstract_key::A + i) as usize] = (0x41 + i) as u8;
        i += 1;
    }
    // '0'..'9' sit at ASCII 0x30..0x39.
    let mut d = 0u32;
    while d < 10 {
        table[(abstract_key::ZERO + d) as usize] = (0x30 + d) as u8;
        d += 1;
    }
    // F1..F12 are contiguous on Win32 starting at VK_F1 (0x70).
    let mut f = 0u32;
    while f < 12 {
        table[(abstract_key::F1 + f) as usize] = VK_F1 + f as u8;
        f += 1;
    }
    table
}

static KEY_TABLE: [u8; TABLE_LEN] = build_table();

/// Resolve an abstract key code to a Win32 virtual-key code; unknown codes
/// resolve to `None` rather than panicking, since the wire is untrusted input.
pub fn to_virtual_key(key_code: u32) -> Option<u8> {
    let idx = key_code as usize;
    if idx >= TABLE_LEN {
        return None;
    }
    match KEY_TABLE[idx] {
        0 => None,
        vk => Some(vk),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_keys_resolve() {
        assert_eq!(to_virtual_key(abstract_key::ENTER), Some(VK_RETURN));
        assert_eq!(to_virtual_key(abstract_key::A), Some(0x41));
        assert_eq!(to_virtual_key(abstract_key::ZERO + 5), Some(0x35));
    }

    #[test]
    fn function_keys_resolve_across_the_full_f1_to_f12_range() {
        assert_eq!(to_virtual_key(abstract_key::F1), Some(VK_F1));
        assert_eq!(to_virtual_key(abstract_key::F1 + 11), Some(VK_F1 + 11));
    }

    #[test]
    fn navigation_and_lock_keys_resolve() {
        assert_eq!(to_virtual_key(abstract_key::CAPS_LOCK), Some(VK_CAPITAL));
        assert_eq!(to_virtual_key(abstract_key::INSERT), Some(VK_INSERT));
        assert_eq!(to_virtual_key(abstract_key::PAGE_UP), Some(VK_PRIOR));
        assert_eq!(to_virtual_key(abstract_key::PAGE_DOWN), Some(VK_NEXT));
    }

    #[test]
    fn punctuation_keys_resolve() {
        assert_eq!(to_virtual_key(abstract_key::COMMA), Some(VK_OEM_COMMA));
        assert_eq!(to_virtual_key(abstract_key::PERIOD), Some(VK_OEM_PERIOD));
        assert_eq!(to_virtual_key(abstract_key::SLASH), Some(VK_OEM_2));
        assert_eq!(to_virtual_key(abstract_key::SEMICOLON), Some(VK_OEM_1));
        assert_eq!(to_virtual_key(abstract_key::QUOTE), Some(VK_OEM_7));
        assert_eq!(to_virtual_key(abstract_key::LEFT_BRACKET), Some(VK_OEM_4));
        assert_eq!(to_virtual_key(abstract_key::RIGHT_BRACKET), Some(VK_OEM_6));
        assert_eq!(to_virtual_key(abstract_key::BACKSLASH), Some(VK_OEM_5));
    }

    #[test]
    fn unknown_and_out_of_range_keys_are_none() {
        assert_eq!(to_virtual_key(255), None);
        assert_eq!(to_virtual_key(9_999), None);
    }
}
