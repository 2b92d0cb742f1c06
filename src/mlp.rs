use std::path::Path;

use candle_core::{DType, Tensor};
use candle_nn::{AdamW, Linear, Module, Optimizer, ParamsAdamW, VarBuilder, VarMap, linear};

use crate::device::device;

pub struct MultiLayerPerceptron {
    pub layers: Vec<Linear>,
    pub var_map: VarMap,
    pub topology: Vec<usize>,
    pub optimiser: AdamW,
}

fn poisoned() -> candle_core::Error {
    candle_core::Error::Msg("var map lock poisoned".to_string())
}

impl MultiLayerPerceptron {
    pub fn new(topology: &[usize], lr: f64) -> Result<Self, candle_core::Error> {
        if topology.len() < 2 {
            return Err(candle_core::Error::Msg(format!(
                "topology needs an input and an output layer: {topology:?}"
            )));
        }
        let vm = VarMap::new();
        let vb = VarBuilder::from_varmap(&vm, DType::F32, device());
        let mut layers: Vec<Linear> = Vec::with_capacity(topology.len() - 1);

        for i in 0..(topology.len() - 1) {
            layers.push(linear(topology[i], topology[i + 1], vb.pp(i))?);
        }

        // no weight decay: plain Adam on the Q-network
        let optimiser = AdamW::new(
            vm.all_vars(),
            ParamsAdamW {
                lr,
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;

        Ok(Self {
            layers,
            topology: topology.to_vec(),
            var_map: vm,
            optimiser,
        })
    }

    pub fn output(&self, inputs: &Tensor) -> Result<Tensor, candle_core::Error> {
        let mut x = inputs.clone();
        for layer in self.layers.iter().take(self.layers.len() - 1) {
            x = layer.forward(&x)?;
            x = x.relu()?;
        }
        if let Some(last_layer) = self.layers.last() {
            x = last_layer.forward(&x)?;
        }
        Ok(x)
    }

    /// Deep-copies every weight and bias of `source` into this network.
    pub fn copy_weights_from(&self, source: &MultiLayerPerceptron) -> Result<(), candle_core::Error> {
        let source_vars = source.var_map.data().lock().map_err(|_| poisoned())?;
        let target_vars = self.var_map.data().lock().map_err(|_| poisoned())?;

        for (name, source_var) in source_vars.iter() {
            if let Some(target_var) = target_vars.get(name) {
                target_var.set(source_var.as_tensor())?;
            }
        }
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), candle_core::Error> {
        self.var_map.save(path)
    }

    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<(), candle_core::Error> {
        self.var_map.load(path)
    }
}
