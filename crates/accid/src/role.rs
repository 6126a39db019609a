//! Accessibility roles for tree nodes.

/// The accessibility role of a node.
///
/// A simplified set of roles; each maps onto an MSAA `ROLE_SYSTEM_*` value
/// for the platform wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum AccessibleRole {
    /// A node with no specific role.
    #[default]
    Unknown,
    /// A window or top-level container.
    Window,
    /// A dialog box.
    Dialog,
    /// A document root.
    Document,
    /// A push button.
    Button,
    /// A checkbox.
    CheckBox,
    /// A radio button.
    RadioButton,
    /// An editable text field.
    TextInput,
    /// Static text.
    Label,
    /// A hyperlink.
    Link,
    /// An image.
    Image,
    /// A list of items.
    List,
    /// An item within a list.
    ListItem,
    /// A table or grid.
    Table,
    /// A row within a table.
    TableRow,
    /// A cell within a table.
    TableCell,
    /// A combo box / dropdown.
    ComboBox,
}

impl AccessibleRole {
    /// The MSAA `ROLE_SYSTEM_*` constant for this role.
    pub fn msaa_role(self) -> u32 {
        match self {
            Self::Unknown => 0x0A,     // ROLE_SYSTEM_CLIENT
            Self::Window => 0x09,      // ROLE_SYSTEM_WINDOW
            Self::Dialog => 0x12,      // ROLE_SYSTEM_DIALOG
            Self::Document => 0x0F,    // ROLE_SYSTEM_DOCUMENT
            Self::Button => 0x2B,      // ROLE_SYSTEM_PUSHBUTTON
            Self::CheckBox => 0x2C,    // ROLE_SYSTEM_CHECKBUTTON
            Self::RadioButton => 0x2D, // ROLE_SYSTEM_RADIOBUTTON
            Self::TextInput => 0x2A,   // ROLE_SYSTEM_TEXT
            Self::Label => 0x29,       // ROLE_SYSTEM_STATICTEXT
            Self::Link => 0x1E,        // ROLE_SYSTEM_LINK
            Self::Image => 0x28,       // ROLE_SYSTEM_GRAPHIC
            Self::List => 0x21,        // ROLE_SYSTEM_LIST
            Self::ListItem => 0x22,    // ROLE_SYSTEM_LISTITEM
            Self::Table => 0x18,       // ROLE_SYSTEM_TABLE
            Self::TableRow => 0x1C,    // ROLE_SYSTEM_ROW
            Self::TableCell => 0x1D,   // ROLE_SYSTEM_CELL
            Self::ComboBox => 0x2E,    // ROLE_SYSTEM_COMBOBOX
        }
    }
}
