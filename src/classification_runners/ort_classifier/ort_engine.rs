//! ONNX Runtime session wrapper: model inspection, execution-provider selection and
//! dtype alignment of inputs and outputs.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use anyhow::Result;
use half::{bf16, f16};
use ndarray::{Array, ArrayD, IxDyn};
use parking_lot::Mutex;
use prost::Message;
use ort::{
    execution_providers::{ExecutionProvider,
                          CPUExecutionProvider,
                          CUDAExecutionProvider,
                          TensorRTExecutionProvider,
                          CoreMLExecutionProvider},
    session::builder::{GraphOptimizationLevel, SessionBuilder},
    session::{Session, SessionInputValue},
    tensor::TensorElementType,
    value::{DynValue, Value},
};

use crate::common::InferenceDevice;
use crate::data::{ConfigOrt, TimeCalc, CROSS_MARK};
use crate::classification_runners::ort_classifier::onnx;
use crate::utils::human_bytes;

/// Names, element types and dims (`0` for symbolic) of a set of graph tensors, index-aligned.
#[derive(Debug, Clone, Default)]
pub struct OrtTensorAttr {
    pub names: Vec<String>,
    pub dtypes: Vec<TensorElementType>,
    pub dimss: Vec<Vec<usize>>,
}

impl OrtTensorAttr {
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }
}

/// ONNXRuntime Backend
///
/// `Session::run` needs exclusive access, so the session sits behind a mutex and the engine
/// itself can be shared.
#[derive(Debug)]
pub struct OrtEngine {
    session: Mutex<Session>,
    device: InferenceDevice,
    inputs_attrs: OrtTensorAttr,
    outputs_attrs: OrtTensorAttr,
    model_proto: onnx::ModelProto,
    profile: bool,
    infer_time: Mutex<TimeCalc>,
}

impl OrtEngine {
    pub fn new(config: &ConfigOrt) -> Result<Self> {
        // onnx graph
        let model_proto = Self::load_onnx(&config.onnx_path)?;
        let graph = match &model_proto.graph {
            Some(graph) => graph,
            None => anyhow::bail!("{CROSS_MARK} No graph found in this proto. Failed to parse ONNX model."),
        };

        // model params & mems
        let byte_alignment = 16;
        let mut params: usize = 0;
        let mut wbmems: usize = 0;
        let mut initializer_names: HashSet<&str> = HashSet::new();
        for tensor_proto in graph.initializer.iter() {
            initializer_names.insert(&tensor_proto.name);
            let param = tensor_proto.dims.iter().product::<i64>().max(0) as usize;
            params += param;
            wbmems += param.div_ceil(byte_alignment) * byte_alignment
                * Self::nbytes_from_onnx_dtype_id(tensor_proto.data_type);
        }

        // inputs & outputs
        let inputs_attrs = Self::io_from_onnx_value_info(&initializer_names, &graph.input);
        let outputs_attrs = Self::io_from_onnx_value_info(&initializer_names, &graph.output);
        if inputs_attrs.names.is_empty() || outputs_attrs.names.is_empty() {
            anyhow::bail!("{CROSS_MARK} Model declares no usable tensor inputs or outputs");
        }
        log::debug!("Inputs: {:?} | Outputs: {:?}", inputs_attrs.names, outputs_attrs.names);

        // build
        let ort_init = if config.ort_lib_path.is_empty() {
            ort::init()
        } else {
            ort::init_from(&config.ort_lib_path)
        };
        match ort_init.commit() {
            Ok(_) => {}
            Err(e) => anyhow::bail!("{CROSS_MARK} Failed to commit ORT environment: {:?}", e),
        };

        let mut builder = Session::builder()?;
        if let Some(n) = config.intra_threads {
            builder = builder.with_intra_threads(n)?;
        }

        let mut device = config.device;
        match device {
            InferenceDevice::TensorRT(device_id) => {
                Self::build_trt(&mut builder, device_id, config.trt_fp16_enable, config.trt_engine_cache_enable)
                    .unwrap_or_else(|err| {
                        log::warn!("{err}, Using cpu");
                        device = InferenceDevice::CPU;
                    })
            }
            InferenceDevice::CUDA(device_id) => Self::build_cuda(&mut builder, device_id).unwrap_or_else(|err| {
                log::warn!("{err}, Using cpu");
                device = InferenceDevice::CPU;
            }),
            InferenceDevice::CoreML(_) => Self::build_coreml(&mut builder).unwrap_or_else(|err| {
                log::warn!("{err}, Using cpu");
                device = InferenceDevice::CPU;
            }),
            InferenceDevice::CPU => {}
        }
        if device == InferenceDevice::CPU {
            Self::build_cpu(&mut builder)?;
        }

        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(&config.onnx_path)?;

        // summary
        log::info!(
            "Backend: ONNXRuntime | Opset: {} | Device: {} | Params: {} | Weights: {}B | Producer: {} {}",
            model_proto.opset_import.first().map(|o| o.version).unwrap_or_default(),
            device,
            human_bytes(params as f64),
            human_bytes(wbmems as f64),
            model_proto.producer_name,
            model_proto.producer_version,
        );

        Ok(Self {
            session: Mutex::new(session),
            device,
            inputs_attrs,
            outputs_attrs,
            model_proto,
            profile: config.profile,
            infer_time: Mutex::new(TimeCalc::default()),
        })
    }

    fn build_trt(builder: &mut SessionBuilder, device_id: usize, fp16_enable: bool, engine_cache_enable: bool) -> Result<()> {
        let trt = TensorRTExecutionProvider::default()
            .with_device_id(device_id as i32)
            .with_fp16(fp16_enable)
            .with_engine_cache(engine_cache_enable)
            .with_engine_cache_path("trt-cache")
            .with_timing_cache(false);
        if trt.is_available()? {
            match trt.register(builder) {
                Ok(_) => {}
                Err(err) => anyhow::bail!("{CROSS_MARK} TensorRT initialization failed: {:?}", err),
            }
            log::info!("Initial model serialization with TensorRT may take some time...");
            Ok(())
        } else {
            anyhow::bail!("{CROSS_MARK} TensorRT execution provider not available")
        }
    }

    fn build_cuda(builder: &mut SessionBuilder, device_id: usize) -> Result<()> {
        let ep = CUDAExecutionProvider::default().with_device_id(device_id as i32);
        if ep.is_available()? {
            match ep.register(builder) {
                Ok(_) => {}
                Err(err) => anyhow::bail!("{CROSS_MARK} CUDA initialization failed: {:?}", err),
            }
            Ok(())
        } else {
            anyhow::bail!("{CROSS_MARK} CUDA execution provider not available")
        }
    }

    fn build_coreml(builder: &mut SessionBuilder) -> Result<()> {
        let ep = CoreMLExecutionProvider::default().with_subgraphs(false);
        if ep.is_available()? {
            match ep.register(builder) {
                Ok(_) => {}
                Err(err) => anyhow::bail!("{CROSS_MARK} CoreML initialization failed: {:?}", err),
            }
            Ok(())
        } else {
            anyhow::bail!("{CROSS_MARK} CoreML execution provider not available")
        }
    }

    fn build_cpu(builder: &mut SessionBuilder) -> Result<()> {
        let ep = CPUExecutionProvider::default();
        if ep.is_available()? {
            match ep.register(builder) {
                Ok(_) => {}
                Err(err) => anyhow::bail!("{CROSS_MARK} CPU initialization failed: {:?}", err),
            }
            Ok(())
        } else {
            anyhow::bail!("{CROSS_MARK} CPU execution provider not available")
        }
    }

    fn tensor_preprocess(x: &ArrayD<f32>, dtype: &TensorElementType) -> Result<DynValue> {
        let x = match dtype {
            TensorElementType::Float32 => Value::from_array(x.clone())?.into_dyn(),
            TensorElementType::Float64 => Value::from_array(x.mapv(|x_| x_ as f64))?.into_dyn(),
            TensorElementType::Float16 => Value::from_array(x.mapv(f16::from_f32))?.into_dyn(),
            TensorElementType::Bfloat16 => Value::from_array(x.mapv(bf16::from_f32))?.into_dyn(),
            TensorElementType::Int8 => Value::from_array(x.mapv(|x_| x_ as i8))?.into_dyn(),
            TensorElementType::Int16 => Value::from_array(x.mapv(|x_| x_ as i16))?.into_dyn(),
            TensorElementType::Int32 => Value::from_array(x.mapv(|x_| x_ as i32))?.into_dyn(),
            TensorElementType::Int64 => Value::from_array(x.mapv(|x_| x_ as i64))?.into_dyn(),
            TensorElementType::Uint8 => Value::from_array(x.mapv(|x_| x_ as u8))?.into_dyn(),
            TensorElementType::Uint16 => Value::from_array(x.mapv(|x_| x_ as u16))?.into_dyn(),
            TensorElementType::Uint32 => Value::from_array(x.mapv(|x_| x_ as u32))?.into_dyn(),
            TensorElementType::Uint64 => Value::from_array(x.mapv(|x_| x_ as u64))?.into_dyn(),
            TensorElementType::Bool => Value::from_array(x.mapv(|x_| x_ != 0.))?.into_dyn(),
            _ => anyhow::bail!("{CROSS_MARK} Unsupported ort input type: {:?}", dtype),
        };
        Ok(x)
    }

    fn tensor_postprocess(x: &DynValue, dtype: &TensorElementType) -> Result<Array<f32, IxDyn>> {
        fn extract_and_convert<T>(x: &DynValue, map_fn: impl Fn(T) -> f32) -> Result<Array<f32, IxDyn>>
        where
            T: Clone + 'static + ort::tensor::PrimitiveTensorElementType,
        {
            let view = x.try_extract_array::<T>()?;
            Ok(view.mapv(map_fn).into_owned())
        }

        match dtype {
            TensorElementType::Float32 => extract_and_convert::<f32>(x, |x| x),
            TensorElementType::Float16 => extract_and_convert::<f16>(x, f16::to_f32),
            TensorElementType::Bfloat16 => extract_and_convert::<bf16>(x, bf16::to_f32),
            TensorElementType::Float64 => extract_and_convert::<f64>(x, |x| x as f32),
            TensorElementType::Int64 => extract_and_convert::<i64>(x, |x| x as f32),
            TensorElementType::Int32 => extract_and_convert::<i32>(x, |x| x as f32),
            TensorElementType::Int16 => extract_and_convert::<i16>(x, |x| x as f32),
            TensorElementType::Int8 => extract_and_convert::<i8>(x, |x| x as f32),
            TensorElementType::Uint64 => extract_and_convert::<u64>(x, |x| x as f32),
            TensorElementType::Uint32 => extract_and_convert::<u32>(x, |x| x as f32),
            TensorElementType::Uint16 => extract_and_convert::<u16>(x, |x| x as f32),
            TensorElementType::Uint8 => extract_and_convert::<u8>(x, |x| x as f32),
            TensorElementType::Bool => extract_and_convert::<bool>(x, |x| x as u8 as f32),
            _ => anyhow::bail!("{CROSS_MARK} Unsupported ort output type: {:?}", dtype),
        }
    }

    /// Runs one forward pass. Every declared input must be present in `feeds` by name; every
    /// declared output is returned as `f32`.
    pub fn run(&self, feeds: &HashMap<String, ArrayD<f32>>) -> Result<HashMap<String, ArrayD<f32>>> {
        // alignment
        let t_pre = Instant::now();
        let mut xs = Vec::with_capacity(self.inputs_attrs.names.len());
        for (name, dtype) in self.inputs_attrs.names.iter().zip(self.inputs_attrs.dtypes.iter()) {
            let x = match feeds.get(name) {
                Some(x) => x,
                None => anyhow::bail!("{CROSS_MARK} Missing feed for model input `{name}`"),
            };
            xs.push(SessionInputValue::from(Self::tensor_preprocess(x, dtype)?));
        }
        let t_pre = t_pre.elapsed();

        // inference & extract
        let t_run = Instant::now();
        let mut session = self.session.lock();
        let outputs = session.run(&xs[..])?;
        let t_run = t_run.elapsed();

        let t_post = Instant::now();
        let mut ys = HashMap::with_capacity(self.outputs_attrs.names.len());
        for (name, dtype) in self.outputs_attrs.names.iter().zip(self.outputs_attrs.dtypes.iter()) {
            let y = match outputs.get(name.as_str()) {
                Some(y) => Self::tensor_postprocess(y, dtype)?,
                None => anyhow::bail!("{CROSS_MARK} Session did not return output `{name}`"),
            };
            ys.insert(name.to_string(), y);
        }
        drop(outputs);
        drop(session);
        let t_post = t_post.elapsed();

        let mut infer_time = self.infer_time.lock();
        infer_time.add_or_push(0, t_pre);
        infer_time.add_or_push(1, t_run);
        infer_time.add_or_push(2, t_post);
        if self.profile {
            log::info!(
                "[Profile] {:.4?} ({:.4?} avg) [alignment: {:.4?} | inference: {:.4?} ({:.4?} avg) | to_f32: {:.4?}]",
                t_pre + t_run + t_post,
                infer_time.avg(),
                t_pre,
                t_run,
                infer_time.avg_i(1),
                t_post,
            );
        }

        Ok(ys)
    }

    fn nbytes_from_onnx_dtype_id(x: i32) -> usize {
        match x {
            7 | 11 | 13 => 8,     // i64, f64, u64
            1 | 6 | 12 => 4,      // f32, i32, u32
            10 | 16 | 5 | 4 => 2, // f16, bf16, i16, u16
            2 | 3 | 9 => 1,       // u8, i8, bool
            _ => 4,
        }
    }

    fn ort_dtype_from_onnx_dtype_id(value: i32) -> Option<TensorElementType> {
        match value {
            1 => Some(TensorElementType::Float32),
            2 => Some(TensorElementType::Uint8),
            3 => Some(TensorElementType::Int8),
            4 => Some(TensorElementType::Uint16),
            5 => Some(TensorElementType::Int16),
            6 => Some(TensorElementType::Int32),
            7 => Some(TensorElementType::Int64),
            8 => Some(TensorElementType::String),
            9 => Some(TensorElementType::Bool),
            10 => Some(TensorElementType::Float16),
            11 => Some(TensorElementType::Float64),
            12 => Some(TensorElementType::Uint32),
            13 => Some(TensorElementType::Uint64),
            16 => Some(TensorElementType::Bfloat16),
            _ => None,
        }
    }

    fn io_from_onnx_value_info(initializer_names: &HashSet<&str>, value_info: &[onnx::ValueInfoProto]) -> OrtTensorAttr {
        let mut attrs = OrtTensorAttr::default();
        for v in value_info.iter() {
            if initializer_names.contains(v.name.as_str()) {
                continue;
            }
            let (elem_type, dims) = match v.tensor_info() {
                Some(info) => info,
                None => continue,
            };
            let dtype = match Self::ort_dtype_from_onnx_dtype_id(elem_type) {
                Some(dtype) => dtype,
                None => continue,
            };
            attrs.names.push(v.name.to_string());
            attrs.dtypes.push(dtype);
            attrs.dimss.push(dims);
        }
        attrs
    }

    pub fn load_onnx<P: AsRef<std::path::Path>>(p: P) -> Result<onnx::ModelProto> {
        let f = std::fs::read(p)?;
        onnx::ModelProto::decode(f.as_slice())
            .map_err(|e| anyhow::anyhow!("{CROSS_MARK} Failed to decode ONNX model: {}", e))
    }

    pub fn graph(&self) -> Option<&onnx::GraphProto> {
        self.model_proto.graph.as_ref()
    }

    pub fn inputs(&self) -> &OrtTensorAttr {
        &self.inputs_attrs
    }

    pub fn outputs(&self) -> &OrtTensorAttr {
        &self.outputs_attrs
    }

    pub fn device(&self) -> InferenceDevice {
        self.device
    }
}
