//! HID usage enums for the switches the pipeline understands.
//!
//! Each enum covers one HID usage page:
//!
//! | Enum                | Usage page                         |
//! |---------------------|------------------------------------|
//! | [`KeyCode`]         | 0x07 Keyboard/Keypad               |
//! | [`ConsumerKeyCode`] | 0x0C Consumer                      |
//! | [`PointingButton`]  | 0x09 Button                        |
//! | [`DpadDirection`]   | 0x01 Generic Desktop (D-pad 0x90+) |
//!
//! Rule files refer to usages by their snake_case names (`"a"`,
//! `"left_shift"`, `"button1"`).  Usages without a named variant are kept as
//! `Other(usage)` so an unfamiliar key is never dropped on the floor.
//!
//! `fn` has no keyboard-page usage; keyboards report it on the vendor
//! top-case page (0x00FF) with usage 0x03, and [`KeyCode::Fn`] carries that id.

use serde::{Deserialize, Serialize};

use super::ModifierFlag;

/// Declares a usage enum together with its usage-id conversions.
macro_rules! usage_table {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident = $usage:literal => $json:literal,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        $vis enum $name {
            $(
                #[serde(rename = $json)]
                $variant,
            )*
            /// A usage on this page without a named variant.
            #[serde(rename = "other")]
            Other(u16),
        }

        impl $name {
            /// Maps a raw usage id to its variant.
            pub fn from_usage(usage: u16) -> Self {
                match usage {
                    $($usage => Self::$variant,)*
                    other => Self::Other(other),
                }
            }

            /// The raw usage id.
            pub fn usage(self) -> u16 {
                match self {
                    $(Self::$variant => $usage,)*
                    Self::Other(usage) => usage,
                }
            }
        }
    };
}

usage_table! {
    /// Keyboard/Keypad page (0x07) usages.
    pub enum KeyCode {
        A = 0x04 => "a",
        B = 0x05 => "b",
        C = 0x06 => "c",
        D = 0x07 => "d",
        E = 0x08 => "e",
        F = 0x09 => "f",
        G = 0x0A => "g",
        H = 0x0B => "h",
        I = 0x0C => "i",
        J = 0x0D => "j",
        K = 0x0E => "k",
        L = 0x0F => "l",
        M = 0x10 => "m",
        N = 0x11 => "n",
        O = 0x12 => "o",
        P = 0x13 => "p",
        Q = 0x14 => "q",
        R = 0x15 => "r",
        S = 0x16 => "s",
        T = 0x17 => "t",
        U = 0x18 => "u",
        V = 0x19 => "v",
        W = 0x1A => "w",
        X = 0x1B => "x",
        Y = 0x1C => "y",
        Z = 0x1D => "z",
        Key1 = 0x1E => "1",
        Key2 = 0x1F => "2",
        Key3 = 0x20 => "3",
        Key4 = 0x21 => "4",
        Key5 = 0x22 => "5",
        Key6 = 0x23 => "6",
        Key7 = 0x24 => "7",
        Key8 = 0x25 => "8",
        Key9 = 0x26 => "9",
        Key0 = 0x27 => "0",
        ReturnOrEnter = 0x28 => "return_or_enter",
        Escape = 0x29 => "escape",
        DeleteOrBackspace = 0x2A => "delete_or_backspace",
        Tab = 0x2B => "tab",
        Spacebar = 0x2C => "spacebar",
        Hyphen = 0x2D => "hyphen",
        EqualSign = 0x2E => "equal_sign",
        OpenBracket = 0x2F => "open_bracket",
        CloseBracket = 0x30 => "close_bracket",
        Backslash = 0x31 => "backslash",
        Semicolon = 0x33 => "semicolon",
        Quote = 0x34 => "quote",
        GraveAccentAndTilde = 0x35 => "grave_accent_and_tilde",
        Comma = 0x36 => "comma",
        Period = 0x37 => "period",
        Slash = 0x38 => "slash",
        CapsLock = 0x39 => "caps_lock",
        F1 = 0x3A => "f1",
        F2 = 0x3B => "f2",
        F3 = 0x3C => "f3",
        F4 = 0x3D => "f4",
        F5 = 0x3E => "f5",
        F6 = 0x3F => "f6",
        F7 = 0x40 => "f7",
        F8 = 0x41 => "f8",
        F9 = 0x42 => "f9",
        F10 = 0x43 => "f10",
        F11 = 0x44 => "f11",
        F12 = 0x45 => "f12",
        PrintScreen = 0x46 => "print_screen",
        ScrollLock = 0x47 => "scroll_lock",
        Pause = 0x48 => "pause",
        Insert = 0x49 => "insert",
        Home = 0x4A => "home",
        PageUp = 0x4B => "page_up",
        DeleteForward = 0x4C => "delete_forward",
        End = 0x4D => "end",
        PageDown = 0x4E => "page_down",
        RightArrow = 0x4F => "right_arrow",
        LeftArrow = 0x50 => "left_arrow",
        DownArrow = 0x51 => "down_arrow",
        UpArrow = 0x52 => "up_arrow",
        LeftControl = 0xE0 => "left_control",
        LeftShift = 0xE1 => "left_shift",
        LeftOption = 0xE2 => "left_option",
        LeftCommand = 0xE3 => "left_command",
        RightControl = 0xE4 => "right_control",
        RightShift = 0xE5 => "right_shift",
        RightOption = 0xE6 => "right_option",
        RightCommand = 0xE7 => "right_command",
        Fn = 0x03 => "fn",
    }
}

impl KeyCode {
    /// The modifier flag this key drives, if it is a modifier key.
    pub fn modifier_flag(self) -> Option<ModifierFlag> {
        match self {
            KeyCode::CapsLock => Some(ModifierFlag::CapsLock),
            KeyCode::LeftControl => Some(ModifierFlag::LeftControl),
            KeyCode::LeftShift => Some(ModifierFlag::LeftShift),
            KeyCode::LeftOption => Some(ModifierFlag::LeftOption),
            KeyCode::LeftCommand => Some(ModifierFlag::LeftCommand),
            KeyCode::RightControl => Some(ModifierFlag::RightControl),
            KeyCode::RightShift => Some(ModifierFlag::RightShift),
            KeyCode::RightOption => Some(ModifierFlag::RightOption),
            KeyCode::RightCommand => Some(ModifierFlag::RightCommand),
            KeyCode::Fn => Some(ModifierFlag::Fn),
            _ => None,
        }
    }
}

usage_table! {
    /// Consumer page (0x0C) usages for media and system keys.
    pub enum ConsumerKeyCode {
        DisplayBrightnessIncrement = 0x6F => "display_brightness_increment",
        DisplayBrightnessDecrement = 0x70 => "display_brightness_decrement",
        Fastforward = 0xB3 => "fastforward",
        Rewind = 0xB4 => "rewind",
        ScanNextTrack = 0xB5 => "scan_next_track",
        ScanPreviousTrack = 0xB6 => "scan_previous_track",
        Eject = 0xB8 => "eject",
        PlayOrPause = 0xCD => "play_or_pause",
        Mute = 0xE2 => "mute",
        VolumeIncrement = 0xE9 => "volume_increment",
        VolumeDecrement = 0xEA => "volume_decrement",
    }
}

usage_table! {
    /// Button page (0x09) usages.
    pub enum PointingButton {
        Button1 = 0x01 => "button1",
        Button2 = 0x02 => "button2",
        Button3 = 0x03 => "button3",
        Button4 = 0x04 => "button4",
        Button5 = 0x05 => "button5",
        Button6 = 0x06 => "button6",
        Button7 = 0x07 => "button7",
        Button8 = 0x08 => "button8",
    }
}

usage_table! {
    /// Generic Desktop D-pad usages, produced by the hat-switch converter.
    pub enum DpadDirection {
        Up = 0x90 => "dpad_up",
        Down = 0x91 => "dpad_down",
        Right = 0x92 => "dpad_right",
        Left = 0x93 => "dpad_left",
    }
}
