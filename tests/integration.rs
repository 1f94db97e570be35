//! Integration tests for the pagination pipeline.
//!
//! These exercise the full path from a styled element tree to finished
//! pages: page breaking, forced and avoided breaks, margin collapsing
//! across pages, multicolumn balancing, flex geometry, margin boxes and
//! the deferred page-total substitution.
//!
//! All measurements use the fixed-advance test adapter (1em per glyph,
//! 0.8em/0.2em ascent/descent) so every assertion is exact.

use std::sync::Arc;

use quire::geometry::{Edges, Rect, Size};
use quire::layout::{Fragment, FragmentKind};
use quire::measure::CharGrid;
use quire::model::*;
use quire::page::Page;
use quire::style::*;
use quire::paginate;

// ─── Helpers ────────────────────────────────────────────────────

fn style(f: impl FnOnce(&mut Style)) -> Arc<Style> {
    let mut s = Style::default();
    f(&mut s);
    Arc::new(s)
}

fn plain() -> Arc<Style> {
    Arc::new(Style::default())
}

fn text(content: &str, s: Arc<Style>) -> Element {
    Element::text(content, s)
}

fn div(s: Arc<Style>, children: Vec<Element>) -> Element {
    Element::container(s, children)
}

/// A 70×70 page with no margins, as used by the break/margin tests.
fn small_page(width: f64, height: f64) -> PageConfig {
    PageConfig {
        size: PageSize::Custom { width, height },
        margin: Edges::uniform(0.0),
    }
}

fn doc_on(page: PageConfig, children: Vec<Element>) -> Document {
    Document {
        root: Element::container(plain(), children),
        page_rules: Vec::new(),
        default_page: page,
    }
}

fn run(doc: &Document) -> Vec<Page> {
    let grid = CharGrid::default();
    paginate(doc, &grid)
}

/// Depth-first walk over a fragment tree.
fn walk<'a>(fragment: &'a Fragment, out: &mut Vec<&'a Fragment>) {
    out.push(fragment);
    for child in &fragment.children {
        walk(child, out);
    }
}

fn all_fragments(page: &Page) -> Vec<&Fragment> {
    let mut out = Vec::new();
    if let Some(root) = &page.root {
        walk(root, &mut out);
    }
    out
}

/// Every childless fragment on the page with the given border-box height
/// (anonymous wrappers share their child's height, so leaves are what the
/// assertions care about).
fn find_by_height(page: &Page, height: f64) -> Vec<&Fragment> {
    all_fragments(page)
        .into_iter()
        .filter(|f| f.children.is_empty() && (f.rect.height - height).abs() < 1e-6)
        .collect()
}

fn page_text(page: &Page) -> String {
    page.root
        .as_ref()
        .map(|r| r.text_content())
        .unwrap_or_default()
}

// ─── Basic pagination ───────────────────────────────────────────

#[test]
fn test_empty_document_is_one_page() {
    let doc = doc_on(PageConfig::default(), vec![]);
    let pages = run(&doc);
    assert_eq!(pages.len(), 1);
}

#[test]
fn test_single_paragraph_single_page() {
    let doc = doc_on(
        PageConfig::default(),
        vec![text("Hello, world", style(|s| s.font_size = 12.0))],
    );
    let pages = run(&doc);
    assert_eq!(pages.len(), 1);
    assert_eq!(page_text(&pages[0]), "Hello, world");
}

#[test]
fn test_page_geometry_honors_margins() {
    let doc = doc_on(
        PageConfig {
            size: PageSize::Custom {
                width: 100.0,
                height: 200.0,
            },
            margin: Edges::uniform(10.0),
        },
        vec![text("ab", style(|s| s.font_size = 10.0))],
    );
    let pages = run(&doc);
    assert_eq!(pages[0].size, Size::new(100.0, 200.0));
    assert_eq!(pages[0].content_box, Rect::new(10.0, 10.0, 80.0, 180.0));
    // The first line starts at the content origin.
    let texts: Vec<&Fragment> = all_fragments(&pages[0])
        .into_iter()
        .filter(|f| matches!(f.kind, FragmentKind::Text { .. }))
        .collect();
    assert!((texts[0].rect.x - 10.0).abs() < 1e-6);
}

#[test]
fn test_long_text_flows_over_pages() {
    // 10 lines of 10pt in a 35pt-tall page: widows/orphans keep groups
    // of at least two lines together.
    let words = vec!["aa"; 10].join(" ");
    let doc = doc_on(
        small_page(20.0, 35.0),
        vec![text(&words, style(|s| s.font_size = 10.0))],
    );
    let pages = run(&doc);
    assert!(pages.len() >= 3);
    // Break conservation: concatenating all pages reproduces the text.
    let mut combined = String::new();
    for page in &pages {
        combined.push_str(&page_text(page));
    }
    assert_eq!(combined, "aaaaaaaaaaaaaaaaaaaa");
}

#[test]
fn test_forced_page_break_between_siblings() {
    let doc = doc_on(
        PageConfig::default(),
        vec![
            div(
                style(|s| {
                    s.height = Dimension::Pt(10.0);
                    s.break_after = BreakBetween::Page;
                }),
                vec![],
            ),
            div(style(|s| s.height = Dimension::Pt(10.0)), vec![]),
        ],
    );
    let pages = run(&doc);
    assert_eq!(pages.len(), 2);
    assert_eq!(find_by_height(&pages[0], 10.0).len(), 1);
    assert_eq!(find_by_height(&pages[1], 10.0).len(), 1);
}

#[test]
fn test_forced_break_ignored_at_page_top() {
    // A break-before on the very first content does not make a blank page.
    let doc = doc_on(
        PageConfig::default(),
        vec![div(
            style(|s| {
                s.height = Dimension::Pt(10.0);
                s.break_before = BreakBetween::Page;
            }),
            vec![],
        )],
    );
    let pages = run(&doc);
    assert_eq!(pages.len(), 1);
}

#[test]
fn test_idempotent_layout() {
    let words = vec!["word"; 40].join(" ");
    let doc = doc_on(
        small_page(100.0, 80.0),
        vec![
            text(&words, style(|s| s.font_size = 10.0)),
            div(style(|s| s.height = Dimension::Pt(30.0)), vec![]),
        ],
    );
    let first = run(&doc);
    let second = run(&doc);
    assert_eq!(format!("{first:?}"), format!("{second:?}"));
}

// ─── Margins across page breaks ─────────────────────────────────

/// A 70pt page holding a 63pt div with `margin: 5 0 8`, twice; the second
/// lands on page two and its top margin obeys `margin-break`.
fn margin_break_doc(break_after: BreakBetween, margin_break: MarginBreak) -> Document {
    let section = |s: Arc<Style>| div(plain(), vec![div(s, vec![])]);
    let div_style = style(|s| {
        s.height = Dimension::Pt(63.0);
        s.margin = MarginEdges {
            top: Dimension::Pt(5.0),
            bottom: Dimension::Pt(8.0),
            ..Default::default()
        };
        s.break_after = break_after;
        s.margin_break = margin_break;
    });
    doc_on(
        small_page(70.0, 70.0),
        vec![section(div_style.clone()), section(div_style)],
    )
}

#[test]
fn test_margin_break_matrix() {
    // (break-after, margin-break) → top margin of the page-two div.
    let cases = [
        (BreakBetween::Page, MarginBreak::Auto, 5.0),
        (BreakBetween::Auto, MarginBreak::Auto, 0.0),
        (BreakBetween::Page, MarginBreak::Keep, 5.0),
        (BreakBetween::Auto, MarginBreak::Keep, 5.0),
        (BreakBetween::Page, MarginBreak::Discard, 0.0),
        (BreakBetween::Auto, MarginBreak::Discard, 0.0),
    ];
    for (break_after, margin_break, expected_top) in cases {
        let doc = margin_break_doc(break_after, margin_break);
        let pages = run(&doc);
        assert_eq!(pages.len(), 2, "{break_after:?}/{margin_break:?}");
        // Page one always keeps its 5pt margin.
        let first = find_by_height(&pages[0], 63.0);
        assert!(
            (first[0].rect.y - 5.0).abs() < 1e-6,
            "page one top margin, {break_after:?}/{margin_break:?}"
        );
        let second = find_by_height(&pages[1], 63.0);
        assert!(
            (second[0].rect.y - expected_top).abs() < 1e-6,
            "page two top margin, {break_after:?}/{margin_break:?}: \
             got {}, want {expected_top}",
            second[0].rect.y
        );
    }
}

// ─── Orphans and widows ─────────────────────────────────────────

#[test]
fn test_orphans_move_short_tail() {
    // 4 lines; only one would fit at the page bottom; orphans=2 moves the
    // whole paragraph to the next page.
    let doc = doc_on(
        small_page(20.0, 50.0),
        vec![
            div(style(|s| s.height = Dimension::Pt(35.0)), vec![]),
            text("aa bb cc dd", style(|s| s.font_size = 10.0)),
        ],
    );
    let pages = run(&doc);
    assert_eq!(pages.len(), 2);
    assert_eq!(page_text(&pages[0]), "");
    assert_eq!(page_text(&pages[1]), "aabbccdd");
}

#[test]
fn test_widows_respected_at_split() {
    // 5 lines in a page that fits 4: widows=2 pulls the cut back to 3.
    let doc = doc_on(
        small_page(20.0, 45.0),
        vec![text("aa bb cc dd ee", style(|s| s.font_size = 10.0))],
    );
    let pages = run(&doc);
    assert_eq!(pages.len(), 2);
    assert_eq!(page_text(&pages[0]), "aabbcc");
    assert_eq!(page_text(&pages[1]), "ddee");
}

// ─── Multicolumn ────────────────────────────────────────────────

#[test]
fn test_four_column_partition() {
    // columns: 4 with no gap over a 400pt page: four 100pt columns at
    // x = 0, 100, 200, 300, all starting at y = 0.
    let words = vec!["aaaa"; 16].join(" ");
    let doc = doc_on(
        small_page(400.0, 1000.0),
        vec![div(
            style(|s| {
                s.column_count = Some(4);
                s.column_gap = 0.0;
                s.font_size = 16.0;
            }),
            vec![text(&words, style(|s| s.font_size = 16.0))],
        )],
    );
    let pages = run(&doc);
    assert_eq!(pages.len(), 1);
    let columns: Vec<&Fragment> = all_fragments(&pages[0])
        .into_iter()
        .filter(|f| matches!(f.kind, FragmentKind::Column))
        .collect();
    assert_eq!(columns.len(), 4);
    let xs: Vec<f64> = columns.iter().map(|c| c.rect.x).collect();
    assert_eq!(xs, vec![0.0, 100.0, 200.0, 300.0]);
    for column in &columns {
        assert!((column.rect.width - 100.0).abs() < 1e-6);
        assert!((column.rect.y - 0.0).abs() < 1e-6);
    }
    // Partition invariant: widths plus gaps fill the container.
    let total: f64 = columns.iter().map(|c| c.rect.width).sum();
    assert!((total - 400.0).abs() < 1e-6);
}

#[test]
fn test_column_span_closes_and_reopens_columns() {
    let spanner = div(
        style(|s| {
            s.column_span = ColumnSpan::All;
            s.height = Dimension::Pt(20.0);
        }),
        vec![],
    );
    let doc = doc_on(
        small_page(200.0, 1000.0),
        vec![div(
            style(|s| {
                s.column_count = Some(2);
                s.column_gap = 0.0;
                s.font_size = 16.0;
            }),
            vec![
                text(&vec!["aaaa"; 4].join(" "), style(|s| s.font_size = 16.0)),
                spanner,
                text(&vec!["bbbb"; 4].join(" "), style(|s| s.font_size = 16.0)),
            ],
        )],
    );
    let pages = run(&doc);
    assert_eq!(pages.len(), 1);
    let multicol = &pages[0].root.as_ref().unwrap().children[0];
    let is_column: Vec<bool> = multicol
        .children
        .iter()
        .map(|c| matches!(c.kind, FragmentKind::Column))
        .collect();
    // Columns, then the spanning block, then columns again.
    let spanner_pos = is_column.iter().position(|c| !c).expect("spanner present");
    assert!(spanner_pos > 0 && spanner_pos < is_column.len() - 1);
    let spanner_frag = &multicol.children[spanner_pos];
    assert!((spanner_frag.rect.width - 200.0).abs() < 1e-6);
    for before in &multicol.children[..spanner_pos] {
        assert!(before.rect.bottom() <= spanner_frag.rect.y + 1e-6);
    }
    for after in &multicol.children[spanner_pos + 1..] {
        assert!(after.rect.y >= spanner_frag.rect.bottom() - 1e-6);
    }
}

#[test]
fn test_columns_break_to_next_page() {
    let words = vec!["aaaa"; 20].join(" ");
    let doc = doc_on(
        small_page(200.0, 48.0),
        vec![div(
            style(|s| {
                s.column_count = Some(2);
                s.column_gap = 0.0;
                s.column_fill = ColumnFill::Auto;
                s.font_size = 16.0;
            }),
            vec![text(&words, style(|s| s.font_size = 16.0))],
        )],
    );
    let pages = run(&doc);
    assert!(pages.len() > 1);
    let mut combined = String::new();
    for page in &pages {
        combined.push_str(&page_text(page));
    }
    assert_eq!(combined, vec!["aaaa"; 20].join(""));
}

// ─── Flex ───────────────────────────────────────────────────────

#[test]
fn test_flex_space_between_geometry() {
    // Three 2pt items in a 12pt row justify to x = 0, 5, 10.
    let item = |_: usize| {
        div(
            style(|s| {
                s.width = Dimension::Pt(2.0);
                s.height = Dimension::Pt(2.0);
                s.font_size = 2.0;
            }),
            vec![],
        )
    };
    let doc = doc_on(
        small_page(12.0, 100.0),
        vec![div(
            style(|s| {
                s.display = Display::Flex;
                s.justify_content = JustifyContent::SpaceBetween;
            }),
            (0..3).map(item).collect(),
        )],
    );
    let pages = run(&doc);
    let container = &pages[0].root.as_ref().unwrap().children[0];
    let xs: Vec<f64> = container.children.iter().map(|c| c.rect.x).collect();
    assert_eq!(xs.len(), 3);
    assert!((xs[0] - 0.0).abs() < 1e-6);
    assert!((xs[1] - 5.0).abs() < 1e-6);
    assert!((xs[2] - 10.0).abs() < 1e-6);
}

#[test]
fn test_flex_column_fragments_like_blocks() {
    let item = || {
        div(
            style(|s| {
                s.height = Dimension::Pt(30.0);
            }),
            vec![],
        )
    };
    let doc = doc_on(
        small_page(100.0, 40.0),
        vec![div(
            style(|s| {
                s.display = Display::Flex;
                s.flex_direction = FlexDirection::Column;
            }),
            vec![item(), item()],
        )],
    );
    let pages = run(&doc);
    assert_eq!(pages.len(), 2);
    assert_eq!(find_by_height(&pages[0], 30.0).len(), 1);
    assert_eq!(find_by_height(&pages[1], 30.0).len(), 1);
}

// ─── Break avoidance ────────────────────────────────────────────

#[test]
fn test_break_inside_avoid_moves_box_to_next_page() {
    let doc = doc_on(
        small_page(100.0, 100.0),
        vec![
            div(style(|s| s.height = Dimension::Pt(60.0)), vec![]),
            div(
                style(|s| {
                    s.height = Dimension::Pt(70.0);
                    s.break_inside = BreakInside::Avoid;
                }),
                vec![],
            ),
        ],
    );
    let pages = run(&doc);
    assert_eq!(pages.len(), 2);
    assert!(find_by_height(&pages[0], 70.0).is_empty());
    assert_eq!(find_by_height(&pages[1], 70.0).len(), 1);
}

#[test]
fn test_unsatisfiable_avoid_is_forced() {
    // A box that can never fit one page still gets split: avoidance is a
    // hint, not a promise.
    let words = vec!["aa"; 30].join(" ");
    let doc = doc_on(
        small_page(20.0, 50.0),
        vec![div(
            style(|s| s.break_inside = BreakInside::Avoid),
            vec![text(&words, style(|s| s.font_size = 10.0))],
        )],
    );
    let pages = run(&doc);
    assert!(pages.len() > 1);
    let mut combined = String::new();
    for page in &pages {
        combined.push_str(&page_text(page));
    }
    assert_eq!(combined.chars().filter(|c| *c == 'a').count(), 60);
}

// ─── Parity and named pages ─────────────────────────────────────

#[test]
fn test_recto_break_inserts_blank_page() {
    let doc = doc_on(
        PageConfig::default(),
        vec![
            div(
                style(|s| {
                    s.height = Dimension::Pt(10.0);
                    s.break_after = BreakBetween::Recto;
                }),
                vec![],
            ),
            div(style(|s| s.height = Dimension::Pt(10.0)), vec![]),
        ],
    );
    let pages = run(&doc);
    // Page 1 is a recto; the next recto is page 3, so a blank verso lands
    // in between.
    assert_eq!(pages.len(), 3);
    assert!(!pages[0].blank);
    assert!(pages[1].blank);
    assert!(pages[1].root.is_none());
    assert!(!pages[2].blank);
    assert_eq!(find_by_height(&pages[2], 10.0).len(), 1);
}

#[test]
fn test_verso_break_when_already_satisfied() {
    let doc = doc_on(
        PageConfig::default(),
        vec![
            div(
                style(|s| {
                    s.height = Dimension::Pt(10.0);
                    s.break_after = BreakBetween::Verso;
                }),
                vec![],
            ),
            div(style(|s| s.height = Dimension::Pt(10.0)), vec![]),
        ],
    );
    let pages = run(&doc);
    // Page 2 is already a verso: no blank needed.
    assert_eq!(pages.len(), 2);
}

#[test]
fn test_named_page_forces_break_and_selects_rule() {
    let mut doc = doc_on(
        small_page(100.0, 100.0),
        vec![
            div(style(|s| s.height = Dimension::Pt(10.0)), vec![]),
            div(
                style(|s| {
                    s.height = Dimension::Pt(10.0);
                    s.page = Some("rotated".into());
                }),
                vec![],
            ),
        ],
    );
    doc.page_rules = vec![PageRule {
        selector: PageSelector {
            name: Some("rotated".into()),
            pseudo: None,
        },
        size: Some(Size::new(200.0, 150.0)),
        margin: Some(Edges::uniform(0.0)),
        margin_boxes: Vec::new(),
    }];
    let pages = run(&doc);
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].size, Size::new(100.0, 100.0));
    assert_eq!(pages[1].size, Size::new(200.0, 150.0));
    assert_eq!(pages[1].name.as_deref(), Some("rotated"));
}

#[test]
fn test_first_page_pseudo_class() {
    let mut doc = doc_on(
        small_page(100.0, 50.0),
        vec![text(&vec!["aa"; 12].join(" "), style(|s| s.font_size = 10.0))],
    );
    doc.page_rules = vec![PageRule {
        selector: PageSelector {
            name: None,
            pseudo: Some(PagePseudo::First),
        },
        size: None,
        margin: Some(Edges::uniform(10.0)),
        margin_boxes: Vec::new(),
    }];
    let pages = run(&doc);
    assert!(pages.len() >= 2);
    assert_eq!(pages[0].content_box.y, 10.0);
    assert_eq!(pages[1].content_box.y, 0.0);
}

// ─── Margin boxes, counters, running elements ───────────────────

fn bottom_center_rule(content: Vec<ContentItem>) -> PageRule {
    PageRule {
        selector: PageSelector::default(),
        size: None,
        margin: None,
        margin_boxes: vec![MarginBoxRule {
            position: MarginBoxPosition::BottomCenter,
            content,
            style: style(|s| s.font_size = 5.0),
            width: None,
            height: None,
        }],
    }
}

fn margin_box_text(page: &Page, position: MarginBoxPosition) -> String {
    page.margin_boxes
        .iter()
        .find(|f| matches!(f.kind, FragmentKind::MarginBox(p) if p == position))
        .map(|f| f.text_content())
        .unwrap_or_default()
}

#[test]
fn test_page_of_pages_counter() {
    let page_break = |s: &mut Style| {
        s.height = Dimension::Pt(10.0);
        s.break_after = BreakBetween::Page;
    };
    let mut doc = doc_on(
        small_page(100.0, 100.0),
        vec![
            div(style(page_break), vec![]),
            div(style(page_break), vec![]),
            div(style(|s| s.height = Dimension::Pt(10.0)), vec![]),
        ],
    );
    doc.default_page.margin = Edges::uniform(10.0);
    doc.page_rules = vec![bottom_center_rule(vec![
        ContentItem::Text {
            text: "Page ".into(),
        },
        ContentItem::Counter {
            name: "page".into(),
            style: CounterStyleKind::Decimal,
        },
        ContentItem::Text { text: " of ".into() },
        ContentItem::Counter {
            name: "pages".into(),
            style: CounterStyleKind::Decimal,
        },
        ContentItem::Text { text: ".".into() },
    ])];
    let pages = run(&doc);
    assert_eq!(pages.len(), 3);
    for (i, page) in pages.iter().enumerate() {
        let expected = format!("Page {} of 3.", i + 1);
        assert_eq!(
            margin_box_text(page, MarginBoxPosition::BottomCenter),
            expected
        );
    }
}

#[test]
fn test_margin_box_geometry_sits_in_margin_strip() {
    let mut doc = doc_on(
        PageConfig {
            size: PageSize::Custom {
                width: 100.0,
                height: 100.0,
            },
            margin: Edges::uniform(20.0),
        },
        vec![text("x", style(|s| s.font_size = 10.0))],
    );
    doc.page_rules = vec![bottom_center_rule(vec![ContentItem::Text {
        text: "mid".into(),
    }])];
    let pages = run(&doc);
    let mb = pages[0]
        .margin_boxes
        .iter()
        .find(|f| matches!(f.kind, FragmentKind::MarginBox(MarginBoxPosition::BottomCenter)))
        .unwrap();
    // Centered in the bottom margin strip.
    assert_eq!(mb.rect.y, 80.0);
    assert_eq!(mb.rect.height, 20.0);
    assert!((mb.rect.x + mb.rect.width / 2.0 - 50.0).abs() < 1e-6);
}

#[test]
fn test_counters_count_document_elements() {
    let heading = |_: usize| {
        div(
            style(|s| {
                s.height = Dimension::Pt(5.0);
                s.counter_increment = vec![("section".into(), 1)];
            }),
            vec![],
        )
    };
    let mut doc = doc_on(small_page(100.0, 100.0), (0..3).map(heading).collect());
    doc.default_page.margin = Edges::uniform(10.0);
    doc.page_rules = vec![bottom_center_rule(vec![ContentItem::Counter {
        name: "section".into(),
        style: CounterStyleKind::UpperRoman,
    }])];
    let pages = run(&doc);
    assert_eq!(
        margin_box_text(&pages[0], MarginBoxPosition::BottomCenter),
        "III"
    );
}

#[test]
fn test_string_set_first_and_last() {
    let chapter = |name: &str| {
        div(
            style(|s| {
                s.height = Dimension::Pt(5.0);
                s.string_set = vec![(
                    "chapter".into(),
                    vec![ContentItem::Text { text: name.into() }],
                )];
            }),
            vec![],
        )
    };
    let mut doc = doc_on(
        small_page(100.0, 100.0),
        vec![chapter("Alpha"), chapter("Beta")],
    );
    doc.page_rules = vec![PageRule {
        selector: PageSelector::default(),
        size: None,
        margin: None,
        margin_boxes: vec![
            MarginBoxRule {
                position: MarginBoxPosition::TopLeft,
                content: vec![ContentItem::String {
                    name: "chapter".into(),
                    select: PageValueSelect::First,
                }],
                style: style(|s| s.font_size = 5.0),
                width: None,
                height: None,
            },
            MarginBoxRule {
                position: MarginBoxPosition::TopRight,
                content: vec![ContentItem::String {
                    name: "chapter".into(),
                    select: PageValueSelect::Last,
                }],
                style: style(|s| s.font_size = 5.0),
                width: None,
                height: None,
            },
        ],
    }];
    // Margins so the strips exist.
    doc.default_page.margin = Edges::uniform(10.0);
    let pages = run(&doc);
    assert_eq!(margin_box_text(&pages[0], MarginBoxPosition::TopLeft), "Alpha");
    assert_eq!(margin_box_text(&pages[0], MarginBoxPosition::TopRight), "Beta");
}

#[test]
fn test_running_element_fills_margin_box() {
    let header = div(
        style(|s| {
            s.position = Position::Running("header".into());
            s.font_size = 5.0;
        }),
        vec![text("Chapter One", style(|s| s.font_size = 5.0))],
    );
    let mut doc = doc_on(
        PageConfig {
            size: PageSize::Custom {
                width: 200.0,
                height: 100.0,
            },
            margin: Edges::uniform(20.0),
        },
        vec![header, text("body", style(|s| s.font_size = 10.0))],
    );
    doc.page_rules = vec![PageRule {
        selector: PageSelector::default(),
        size: None,
        margin: None,
        margin_boxes: vec![MarginBoxRule {
            position: MarginBoxPosition::TopCenter,
            content: vec![ContentItem::Element {
                name: "header".into(),
                select: PageValueSelect::First,
            }],
            style: style(|s| s.font_size = 5.0),
            width: None,
            height: None,
        }],
    }];
    let pages = run(&doc);
    assert_eq!(
        margin_box_text(&pages[0], MarginBoxPosition::TopCenter),
        "Chapter One"
    );
    // The running element itself is out of flow.
    assert_eq!(page_text(&pages[0]), "body");
}

#[test]
fn test_missing_running_element_resolves_empty() {
    let mut doc = doc_on(
        PageConfig::default(),
        vec![text("body", style(|s| s.font_size = 10.0))],
    );
    doc.page_rules = vec![PageRule {
        selector: PageSelector::default(),
        size: None,
        margin: None,
        margin_boxes: vec![MarginBoxRule {
            position: MarginBoxPosition::TopCenter,
            content: vec![ContentItem::Element {
                name: "nope".into(),
                select: PageValueSelect::First,
            }],
            style: plain(),
            width: None,
            height: None,
        }],
    }];
    let pages = run(&doc);
    assert_eq!(margin_box_text(&pages[0], MarginBoxPosition::TopCenter), "");
}

#[test]
fn test_target_counter_reports_anchor_page() {
    let filler = div(
        style(|s| {
            s.height = Dimension::Pt(10.0);
            s.break_after = BreakBetween::Page;
        }),
        vec![],
    );
    let target = div(style(|s| s.height = Dimension::Pt(10.0)), vec![]).with_id("dest");
    let mut doc = doc_on(small_page(100.0, 100.0), vec![filler, target]);
    doc.page_rules = vec![bottom_center_rule(vec![
        ContentItem::Text { text: "see p. ".into() },
        ContentItem::TargetCounter {
            target: "dest".into(),
            name: "page".into(),
            style: CounterStyleKind::Decimal,
        },
    ])];
    doc.default_page.margin = Edges::uniform(5.0);
    let pages = run(&doc);
    assert_eq!(pages.len(), 2);
    // Both pages agree the anchor is on page 2.
    for page in &pages {
        assert_eq!(
            margin_box_text(page, MarginBoxPosition::BottomCenter),
            "see p. 2"
        );
    }
    // The anchor index also lands on the page itself.
    assert!(pages[1].anchors.iter().any(|a| a.id == "dest"));
}

// ─── Positioned and fixed boxes ─────────────────────────────────

#[test]
fn test_fixed_box_repeats_on_every_page() {
    let fixed = div(
        style(|s| {
            s.position = Position::Fixed;
            s.top = Some(0.0);
            s.left = Some(0.0);
            s.width = Dimension::Pt(5.0);
            s.height = Dimension::Pt(5.0);
        }),
        vec![],
    );
    let doc = doc_on(
        small_page(20.0, 35.0),
        vec![fixed, text(&vec!["aa"; 10].join(" "), style(|s| s.font_size = 10.0))],
    );
    let pages = run(&doc);
    assert!(pages.len() > 1);
    for page in &pages {
        assert_eq!(
            find_by_height(page, 5.0).len(),
            1,
            "fixed box on page {}",
            page.index
        );
    }
}

#[test]
fn test_absolute_box_against_page_area() {
    let abs = div(
        style(|s| {
            s.position = Position::Absolute;
            s.top = Some(10.0);
            s.left = Some(10.0);
            s.width = Dimension::Pt(5.0);
            s.height = Dimension::Pt(5.0);
        }),
        vec![],
    );
    let doc = doc_on(small_page(100.0, 100.0), vec![abs]);
    let pages = run(&doc);
    let frag = find_by_height(&pages[0], 5.0)[0];
    assert!((frag.rect.x - 10.0).abs() < 1e-6);
    assert!((frag.rect.y - 10.0).abs() < 1e-6);
}

// ─── JSON surface ───────────────────────────────────────────────

#[test]
fn test_paginate_json_round_trip() {
    let doc = doc_on(
        PageConfig::default(),
        vec![text("From JSON", style(|s| s.font_size = 12.0))],
    );
    let json = serde_json::to_string(&doc).unwrap();
    let grid = CharGrid::default();
    let pages = quire::paginate_json(&json, &grid).unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(page_text(&pages[0]), "From JSON");
}
