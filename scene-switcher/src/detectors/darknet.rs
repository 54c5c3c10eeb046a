use async_trait::async_trait;
use image::RgbImage;
use interfaces::defs::{BoundingBox, DetectError, Detector, Frame, Observation};
use opencv::{
    core::{self, Mat, Scalar, Size, Vector, CV_32F},
    dnn,
    prelude::*,
};
use std::path::Path;
use std::sync::{Arc, Mutex};

fn cv_error(e: opencv::Error) -> DetectError {
    DetectError::Inference(e.to_string())
}

/// YOLOv3 through OpenCV's DNN module, loaded from Darknet cfg/weights files.
pub struct DarknetDetector {
    net: Arc<Mutex<dnn::Net>>,
    output_layers: Arc<Vec<String>>,
    classes: Arc<Vec<String>>,
    input_size: i32,
}

impl DarknetDetector {
    pub fn load(
        config: &Path,
        weights: &Path,
        names: &Path,
        input_size: i32,
    ) -> Result<Self, DetectError> {
        let classes: Vec<String> = std::fs::read_to_string(names)
            .map_err(|e| DetectError::Inference(format!("{}: {}", names.display(), e)))?
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect();

        let net = dnn::read_net(
            &weights.to_string_lossy(),
            &config.to_string_lossy(),
            "",
        )
        .map_err(cv_error)?;
        let output_layers = net
            .get_unconnected_out_layers_names()
            .map_err(cv_error)?
            .iter()
            .collect();

        Ok(Self {
            net: Arc::new(Mutex::new(net)),
            output_layers: Arc::new(output_layers),
            classes: Arc::new(classes),
            input_size,
        })
    }
}

fn to_mat(image: &RgbImage) -> Result<Mat, DetectError> {
    let pixels: Vec<core::Vec3b> = image
        .pixels()
        .map(|p| core::VecN([p[0], p[1], p[2]]))
        .collect();
    let borrowed =
        Mat::new_rows_cols_with_data(image.height() as i32, image.width() as i32, &pixels)
            .map_err(cv_error)?;
    borrowed.try_clone().map_err(cv_error)
}

fn run_inference(
    net: &Mutex<dnn::Net>,
    output_layers: &[String],
    classes: &[String],
    image: &RgbImage,
    input_size: i32,
) -> Result<Vec<Observation>, DetectError> {
    let mat = to_mat(image)?;
    // Frames are already RGB, so no channel swap
    let blob = dnn::blob_from_image(
        &mat,
        1.0 / 255.0,
        Size::new(input_size, input_size),
        Scalar::default(),
        false,
        false,
        CV_32F,
    )
    .map_err(cv_error)?;

    let mut layer_names = Vector::<String>::new();
    for name in output_layers {
        layer_names.push(name.as_str());
    }
    let mut outputs: Vector<Mat> = Vector::new();
    {
        let mut net = net
            .lock()
            .map_err(|_| DetectError::Inference("network lock poisoned".to_string()))?;
        net.set_input(&blob, "", 1.0, Scalar::default())
            .map_err(cv_error)?;
        net.forward(&mut outputs, &layer_names).map_err(cv_error)?;
    }

    let (width, height) = (image.width() as f32, image.height() as f32);
    let mut observations = Vec::new();
    for output in outputs.iter() {
        for row in 0..output.rows() {
            let detection = output.at_row::<f32>(row).map_err(cv_error)?;
            if detection.len() <= 5 {
                continue;
            }
            // [cx, cy, w, h, objectness, class scores...]
            let (class_id, confidence) = detection[5..]
                .iter()
                .copied()
                .enumerate()
                .fold((0, f32::MIN), |best, (i, score)| {
                    if score > best.1 {
                        (i, score)
                    } else {
                        best
                    }
                });

            let Some(class_label) = classes.get(class_id) else {
                continue;
            };
            let (box_width, box_height) = (detection[2] * width, detection[3] * height);
            observations.push(Observation::new(
                class_label.clone(),
                confidence,
                BoundingBox {
                    x: detection[0] * width - box_width / 2.0,
                    y: detection[1] * height - box_height / 2.0,
                    width: box_width,
                    height: box_height,
                },
            ));
        }
    }
    Ok(observations)
}

#[async_trait]
impl Detector for DarknetDetector {
    fn detector_name(&self) -> String {
        "darknet-yolov3".to_string()
    }

    async fn detect(&self, frame: &Frame) -> Result<Vec<Observation>, DetectError> {
        if frame.is_empty() {
            return Err(DetectError::InvalidFrame("empty frame".to_string()));
        }

        let net = self.net.clone();
        let output_layers = self.output_layers.clone();
        let classes = self.classes.clone();
        let image = frame.shared_image();
        let input_size = self.input_size;

        tokio::task::spawn_blocking(move || {
            run_inference(&net, &output_layers, &classes, &image, input_size)
        })
        .await
        .map_err(|e| DetectError::Inference(e.to_string()))?
    }
}
