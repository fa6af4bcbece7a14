//! Demo page and a scripted editing session over it.

use std::fmt;

use strata_model::{ObjectIndex, ObjectRef, Result, UndoHistory};

use crate::model::{
    layer_name, walk_layers, Bounds, Color, Fill, FrameLayer, GradientFill, Page, RectLayer, Shadow, TextLayer,
};

/// The demo page with handles to the layers the session edits.
pub struct DemoPage {
    pub page: ObjectRef,
    pub header: ObjectRef,
    pub title: ObjectRef,
    pub subtitle: ObjectRef,
    pub card: ObjectRef,
    pub button: ObjectRef,
}

impl DemoPage {
    pub fn build() -> Result<Self> {
        let page = ObjectRef::new(Page::new("Landing"));
        let header = ObjectRef::with_owner(FrameLayer::new("header", Bounds::new(0.0, 0.0, 800.0, 120.0)), &page);
        let title = ObjectRef::with_owner(
            TextLayer::new("title", Bounds::new(40.0, 24.0, 480.0, 48.0), "Strata"),
            &header,
        );
        let subtitle = ObjectRef::with_owner(
            TextLayer::new("subtitle", Bounds::new(40.0, 76.0, 480.0, 24.0), "Layered documents"),
            &header,
        );
        let card = ObjectRef::with_owner(RectLayer::new("card", Bounds::new(40.0, 160.0, 320.0, 200.0)), &page);
        let button = ObjectRef::with_owner(RectLayer::new("button", Bounds::new(40.0, 400.0, 120.0, 40.0)), &page);

        title.write_as::<TextLayer>()?.font_size = 36.0;
        header
            .write_as::<FrameLayer>()?
            .children
            .extend([title.clone(), subtitle.clone()]);
        card.write_as::<RectLayer>()?.corner_radius = 12.0;
        {
            let mut p = page.write_as::<Page>()?;
            p.guides = vec![40.0, 400.0, 760.0];
            p.background = ObjectRef::with_owner(
                GradientFill::new(vec![Color::WHITE, Color::rgb(0.85, 0.9, 1.0)], 90.0),
                &page,
            );
            p.layers = vec![header.clone(), card.clone(), button.clone()];
            p.selection = Some(title.id());
        }

        Ok(Self {
            page,
            header,
            title,
            subtitle,
            card,
            button,
        })
    }

    /// Apply the scripted edits, one undo step each. Returns the step count.
    pub fn run_session(&self, history: &mut UndoHistory) -> Result<usize> {
        history.record::<Page, _>(&self.page, |p| p.name = "Landing v2".to_string())?;

        // Moving and recoloring the card is one step.
        history.begin_changeset();
        let moved = history
            .record::<RectLayer, _>(&self.card, |r| r.bounds.translate(24.0, -16.0))
            .and_then(|()| {
                let fill = self.card.read_as::<RectLayer>()?.fill.clone();
                history.record::<Fill, _>(&fill, |f| f.color = Color::rgb(0.2, 0.4, 0.9))
            });
        history.commit_changeset();
        moved?;

        let shadow = ObjectRef::with_owner(
            Shadow {
                color: Color::BLACK.with_alpha(0.25),
                blur: 6.0,
                offset_x: 0.0,
                offset_y: 2.0,
            },
            &self.subtitle,
        );
        history.record::<TextLayer, _>(&self.subtitle, |t| t.shadow = Some(shadow))?;

        let button = self.button.clone();
        history.record::<Page, _>(&self.page, |p| p.layers.retain(|l| !l.ptr_eq(&button)))?;
        Ok(4)
    }
}

/// What a page holds, for logging.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSummary {
    pub name: String,
    pub layers: Vec<String>,
    pub objects: usize,
    pub selection: Option<String>,
}

impl PageSummary {
    pub fn of(page: &ObjectRef) -> Result<Self> {
        let index = ObjectIndex::collect(page)?;
        let layers = walk_layers(page)?
            .iter()
            .map(layer_name)
            .collect::<Result<Vec<_>>>()?;
        let p = page.read_as::<Page>()?;
        let selection = match p.selection.and_then(|id| index.resolve(id)) {
            Some(layer) => Some(layer_name(&layer)?),
            None => None,
        };
        Ok(Self {
            name: p.name.clone(),
            layers,
            objects: index.len(),
            selection,
        })
    }
}

impl fmt::Display for PageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "page `{}`: {} objects, layers [{}]",
            self.name,
            self.objects,
            self.layers.join(", ")
        )?;
        if let Some(selection) = &self.selection {
            write!(f, ", selected `{selection}`")?;
        }
        Ok(())
    }
}
