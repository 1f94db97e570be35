//! # Document Model
//!
//! The input to the engine: a styled element tree plus the page rule sets
//! that govern page geometry and margin-box content.
//!
//! Everything upstream of layout (parsing, cascade, generated-content
//! materialization) has already happened. Each element arrives with a
//! fully resolved [`Style`] behind an `Arc`, and pseudo-element boxes are
//! ordinary elements in the tree.

use std::sync::Arc;

use crate::geometry::{Edges, Size};
use crate::style::{ContentItem, Style};
use serde::{Deserialize, Serialize};

/// A complete document ready for pagination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// The root element. Typically the `html` box of the source tree.
    pub root: Element,

    /// `@page` rule sets, in source order.
    #[serde(default)]
    pub page_rules: Vec<PageRule>,

    /// Page geometry used when no `@page` rule supplies one.
    #[serde(default)]
    pub default_page: PageConfig,
}

impl Document {
    pub fn new(root: Element) -> Self {
        Self {
            root,
            page_rules: Vec::new(),
            default_page: PageConfig::default(),
        }
    }
}

/// Page size and margins when no rule overrides them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageConfig {
    #[serde(default)]
    pub size: PageSize,
    #[serde(default = "default_page_margin")]
    pub margin: Edges,
}

fn default_page_margin() -> Edges {
    Edges::uniform(54.0) // ~0.75 inch
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            size: PageSize::A4,
            margin: default_page_margin(),
        }
    }
}

/// Standard page sizes in points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum PageSize {
    #[default]
    A4,
    A3,
    A5,
    Letter,
    Legal,
    Tabloid,
    Custom {
        width: f64,
        height: f64,
    },
}

impl PageSize {
    /// Returns (width, height) in points.
    pub fn dimensions(&self) -> (f64, f64) {
        match self {
            PageSize::A4 => (595.28, 841.89),
            PageSize::A3 => (841.89, 1190.55),
            PageSize::A5 => (419.53, 595.28),
            PageSize::Letter => (612.0, 792.0),
            PageSize::Legal => (612.0, 1008.0),
            PageSize::Tabloid => (792.0, 1224.0),
            PageSize::Custom { width, height } => (*width, *height),
        }
    }
}

/// A node of the input tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub kind: ElementKind,

    /// Resolved style, shared and immutable.
    pub style: Arc<Style>,

    #[serde(default)]
    pub children: Vec<Element>,

    /// Element identity, used by anchors and cross-references.
    #[serde(default)]
    pub id: Option<String>,
}

/// What an element contains, independent of how it is displayed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ElementKind {
    /// A container; its formatting context comes from `style.display`.
    Container,

    /// A text node. The string is raw: white-space processing happens at
    /// layout time according to the governing style.
    Text { content: String },

    /// A replaced element (image, vector graphic) with an intrinsic size.
    Replaced { intrinsic: Size },

    /// A forced line break (`<br>`).
    LineBreak,
}

impl Element {
    /// Create a container element.
    pub fn container(style: Arc<Style>, children: Vec<Element>) -> Self {
        Self {
            kind: ElementKind::Container,
            style,
            children,
            id: None,
        }
    }

    /// Create a text element.
    pub fn text(content: &str, style: Arc<Style>) -> Self {
        Self {
            kind: ElementKind::Text {
                content: content.to_string(),
            },
            style,
            children: Vec::new(),
            id: None,
        }
    }

    /// Create a replaced element.
    pub fn replaced(intrinsic: Size, style: Arc<Style>) -> Self {
        Self {
            kind: ElementKind::Replaced { intrinsic },
            style,
            children: Vec::new(),
            id: None,
        }
    }

    /// Create a forced line break.
    pub fn line_break(style: Arc<Style>) -> Self {
        Self {
            kind: ElementKind::LineBreak,
            style,
            children: Vec::new(),
            id: None,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }
}

/// One `@page` rule set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRule {
    #[serde(default)]
    pub selector: PageSelector,

    /// Page box size override.
    #[serde(default)]
    pub size: Option<Size>,

    /// Page margin override.
    #[serde(default)]
    pub margin: Option<Edges>,

    /// Margin boxes declared by this rule.
    #[serde(default)]
    pub margin_boxes: Vec<MarginBoxRule>,
}

/// The selector of an `@page` rule: an optional page name plus an optional
/// pseudo-class.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSelector {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pseudo: Option<PagePseudo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PagePseudo {
    First,
    Blank,
    Left,
    Right,
    /// `:nth(An+B)`, optionally scoped to the current named-page group.
    Nth {
        a: i32,
        b: i32,
        #[serde(default)]
        of_name: bool,
    },
}

/// The sixteen page-margin box positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarginBoxPosition {
    TopLeftCorner,
    TopLeft,
    TopCenter,
    TopRight,
    TopRightCorner,
    BottomLeftCorner,
    BottomLeft,
    BottomCenter,
    BottomRight,
    BottomRightCorner,
    LeftTop,
    LeftMiddle,
    LeftBottom,
    RightTop,
    RightMiddle,
    RightBottom,
}

impl MarginBoxPosition {
    /// Is this one of the four corner boxes (fixed geometry)?
    pub fn is_corner(&self) -> bool {
        matches!(
            self,
            MarginBoxPosition::TopLeftCorner
                | MarginBoxPosition::TopRightCorner
                | MarginBoxPosition::BottomLeftCorner
                | MarginBoxPosition::BottomRightCorner
        )
    }
}

/// A margin box declared inside an `@page` rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginBoxRule {
    pub position: MarginBoxPosition,
    pub content: Vec<ContentItem>,
    #[serde(default)]
    pub style: Arc<Style>,
    /// Definite box width, when declared.
    #[serde(default)]
    pub width: Option<f64>,
    /// Definite box height, when declared.
    #[serde(default)]
    pub height: Option<f64>,
}
