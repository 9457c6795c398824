use std::cell::RefCell;
use std::rc::Rc;

use gtk4::cairo;
use gtk4::prelude::*;

use crate::app::BackendEvent;
use crate::error::RecognitionError;
use crate::raster::RasterImage;

type Stroke = Vec<(f64, f64)>;

/// Handles returned from building the drawing surface.
pub struct CanvasWidgets {
    pub area: gtk4::DrawingArea,
    pub strokes: Rc<RefCell<Vec<Stroke>>>,
}

/// Build a fixed-size drawing surface. Each finished drag sends a snapshot
/// of the whole canvas as `BackendEvent::StrokeCompleted`.
pub fn build_canvas(
    width: i32,
    height: i32,
    stroke_width: f64,
    backend_sender: async_channel::Sender<BackendEvent>,
) -> CanvasWidgets {
    let area = gtk4::DrawingArea::new();
    area.set_content_width(width);
    area.set_content_height(height);
    area.set_halign(gtk4::Align::Center);
    area.set_valign(gtk4::Align::Center);

    let strokes: Rc<RefCell<Vec<Stroke>>> = Rc::new(RefCell::new(Vec::new()));

    let strokes_for_draw = strokes.clone();
    area.set_draw_func(move |_area, cr, _width, _height| {
        if let Err(e) = paint(cr, &strokes_for_draw.borrow(), stroke_width) {
            log::warn!("Canvas draw failed: {e}");
        }
    });

    let drag = gtk4::GestureDrag::new();

    {
        let strokes = strokes.clone();
        let area = area.clone();
        drag.connect_drag_begin(move |_, x, y| {
            strokes.borrow_mut().push(vec![(x, y)]);
            area.queue_draw();
        });
    }

    {
        let strokes = strokes.clone();
        let area = area.clone();
        drag.connect_drag_update(move |gesture, dx, dy| {
            if let (Some((x, y)), Some(stroke)) =
                (gesture.start_point(), strokes.borrow_mut().last_mut())
            {
                stroke.push((x + dx, y + dy));
            }
            area.queue_draw();
        });
    }

    {
        let strokes = strokes.clone();
        drag.connect_drag_end(move |_, _, _| {
            let image = match snapshot(&strokes.borrow(), width, height, stroke_width) {
                Ok(image) => Some(image),
                Err(e) => {
                    log::error!("Failed to capture canvas: {e}");
                    None
                }
            };
            let _ = backend_sender.try_send(BackendEvent::StrokeCompleted(image));
        });
    }

    area.add_controller(drag);

    CanvasWidgets { area, strokes }
}

/// Remove every stroke and repaint the blank canvas.
pub fn clear_canvas(canvas: &CanvasWidgets) {
    canvas.strokes.borrow_mut().clear();
    canvas.area.queue_draw();
}

/// Black round-capped strokes on a white background.
fn paint(cr: &cairo::Context, strokes: &[Stroke], stroke_width: f64) -> Result<(), cairo::Error> {
    cr.set_source_rgb(1.0, 1.0, 1.0);
    cr.paint()?;

    cr.set_source_rgb(0.0, 0.0, 0.0);
    cr.set_line_width(stroke_width);
    cr.set_line_cap(cairo::LineCap::Round);
    cr.set_line_join(cairo::LineJoin::Round);

    for stroke in strokes {
        let Some(&(x0, y0)) = stroke.first() else {
            continue;
        };
        cr.move_to(x0, y0);
        // Includes the first point so a single tap still leaves a dot.
        for &(x, y) in stroke {
            cr.line_to(x, y);
        }
        cr.stroke()?;
    }
    Ok(())
}

/// Render the strokes offscreen and read the pixels back.
pub fn snapshot(
    strokes: &[Stroke],
    width: i32,
    height: i32,
    stroke_width: f64,
) -> Result<RasterImage, RecognitionError> {
    let cairo_err = |e: cairo::Error| RecognitionError::InvalidInput(format!("cairo: {e}"));

    let mut surface =
        cairo::ImageSurface::create(cairo::Format::ARgb32, width, height).map_err(cairo_err)?;
    {
        let cr = cairo::Context::new(&surface).map_err(cairo_err)?;
        paint(&cr, strokes, stroke_width).map_err(cairo_err)?;
    }
    surface.flush();

    let stride = surface.stride() as usize;
    let data = surface
        .data()
        .map_err(|e| RecognitionError::InvalidInput(format!("canvas pixels unavailable: {e}")))?;
    RasterImage::from_argb32(width as usize, height as usize, stride, &data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::tests::pixel;

    #[test]
    fn snapshot_renders_ink_on_white() {
        let strokes = vec![vec![(100.0, 20.0), (100.0, 180.0)]];
        let image = snapshot(&strokes, 200, 200, 14.0).unwrap();

        assert_eq!(image.width(), 200);
        assert_eq!(image.height(), 200);
        assert_eq!(pixel(&image, 100, 100), [0, 0, 0, 255]);
        assert_eq!(pixel(&image, 10, 10), [255, 255, 255, 255]);
    }

    #[test]
    fn single_tap_leaves_a_dot() {
        let strokes = vec![vec![(50.0, 50.0)]];
        let image = snapshot(&strokes, 100, 100, 10.0).unwrap();
        assert_eq!(pixel(&image, 50, 50), [0, 0, 0, 255]);
    }

    #[test]
    fn blank_canvas_is_white() {
        let image = snapshot(&[], 8, 8, 4.0).unwrap();
        assert!(image.view().iter().all(|&b| b == 255));
    }
}
